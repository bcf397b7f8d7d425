use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use cdp_config::{DiameterConfig, PeerEntry};
use cdp_runtime::{DiameterEngine, MemoryNetwork};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn engine() -> Arc<DiameterEngine> {
    let mut config = DiameterConfig::new("scscf.ims.test", "ims.test");
    config.peers.push(PeerEntry {
        fqdn: "hss.ims.test".into(),
        realm: "ims.test".into(),
        port: 3868,
        src_addr: None,
    });
    let engine = DiameterEngine::with_connector(config, MemoryNetwork::new().connector()).unwrap();
    engine.start().await.unwrap();
    engine
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_list_peers() {
    let engine = engine().await;
    let app = cdp_node::create_router(engine.clone());

    let (status, body) = call(app, "GET", "/api/v1/peers").await;
    assert_eq!(status, StatusCode::OK);
    let peers: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(peers.as_array().unwrap().len(), 1);
    assert_eq!(peers[0]["fqdn"], "hss.ims.test");
    assert_eq!(peers[0]["disabled"], false);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_disable_and_enable_peer() {
    let engine = engine().await;
    let app = cdp_node::create_router(engine.clone());

    let (status, _) = call(app.clone(), "POST", "/api/v1/peers/hss.ims.test/disable").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(engine.list_peers()[0].disabled);

    let (status, _) = call(app.clone(), "POST", "/api/v1/peers/hss.ims.test/enable").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!engine.list_peers()[0].disabled);

    let (status, body) = call(app, "POST", "/api/v1/peers/nobody.ims.test/disable").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("nobody.ims.test"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_stats_and_metrics() {
    let engine = engine().await;
    let app = cdp_node::create_router(engine.clone());

    let (status, body) = call(app.clone(), "GET", "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["replies_received"], 0);
    assert_eq!(stats["average_response_time"], 0);

    let (status, body) = call(app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("cdp_request_timeouts_total"));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_shutdown() {
    let engine = engine().await;
    let app = cdp_node::create_router(engine.clone());

    let (status, body) = call(app.clone(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");

    engine.shutdown().await;
    let (status, _) = call(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

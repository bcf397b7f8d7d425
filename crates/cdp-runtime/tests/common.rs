#![allow(dead_code)]

use cdp_config::{DiameterConfig, PeerEntry, RealmRoutes, RouteEntry};
use cdp_core::Application;
use cdp_dict::application;
use cdp_peer_core::PeerState;
use cdp_runtime::{DiameterEngine, MemoryNetwork};
use std::sync::Arc;
use std::time::Duration;

pub const CLIENT: &str = "scscf.ims.test";
pub const SERVER: &str = "hss.ims.test";
pub const REALM: &str = "ims.test";

fn base_config(fqdn: &str) -> DiameterConfig {
    let mut config = DiameterConfig::new(fqdn, REALM);
    config.applications = vec![Application::auth(application::CX, 0)];
    config.timer_resolution_ms = 10;
    config.workers = 2;
    config
}

/// Client dialling the server and routing the realm to it
pub fn client_config() -> DiameterConfig {
    let mut config = base_config(CLIENT);
    config.peers.push(PeerEntry {
        fqdn: SERVER.into(),
        realm: REALM.into(),
        port: 3868,
        src_addr: None,
    });
    config.routing.realms.push(RealmRoutes {
        realm: REALM.into(),
        routes: vec![RouteEntry {
            fqdn: SERVER.into(),
            metric: 1,
        }],
    });
    config
}

/// Server accepting unknown peers
pub fn server_config() -> DiameterConfig {
    named_server_config(SERVER)
}

pub fn named_server_config(fqdn: &str) -> DiameterConfig {
    let mut config = base_config(fqdn);
    config.accept_unknown_peers = true;
    config
}

pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

pub fn state_of(engine: &DiameterEngine, fqdn: &str) -> Option<PeerState> {
    engine
        .list_peers()
        .into_iter()
        .find(|p| p.fqdn.eq_ignore_ascii_case(fqdn))
        .map(|p| p.state)
}

/// Start an engine reachable as `fqdn` on `network`
pub async fn start_on(
    network: &Arc<MemoryNetwork>,
    fqdn: &str,
    config: DiameterConfig,
) -> Arc<DiameterEngine> {
    cdp_logging::init_test();
    let engine = DiameterEngine::with_connector(config, network.connector()).unwrap();
    network.register(fqdn, &engine);
    engine.start().await.unwrap();
    engine
}

/// Two engines on one in-memory network with the client's peer open
pub async fn connected_pair(
    client: DiameterConfig,
    server: DiameterConfig,
) -> (Arc<DiameterEngine>, Arc<DiameterEngine>) {
    let network = MemoryNetwork::new();
    let server = start_on(&network, SERVER, server).await;
    let client = start_on(&network, CLIENT, client).await;

    let opened = wait_until(|| state_of(&client, SERVER) == Some(PeerState::IOpen)).await;
    assert!(opened, "client never reached I-Open");
    (client, server)
}

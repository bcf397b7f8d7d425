use anyhow::Context;
use cdp_config::DiameterConfig;
use cdp_logging::LogFormat;
use cdp_runtime::DiameterEngine;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "config/cdp";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CDP_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config: DiameterConfig =
        cdp_config::load_config(&path).with_context(|| format!("loading configuration {path}"))?;

    let format = std::env::var("CDP_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or(LogFormat::Json);
    cdp_logging::init_with_format(&config.log_level, format);

    info!(
        service = "cdp-node",
        version = env!("CARGO_PKG_VERSION"),
        fqdn = %config.fqdn,
        realm = %config.realm,
        "Starting Diameter node"
    );

    let management_addr = config.management_addr.clone();
    let engine = DiameterEngine::new(config).context("creating engine")?;
    engine.start().await.context("starting engine")?;

    let server = match management_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding management address {addr}"))?;
            info!(addr = %addr, "management API listening");
            let app = cdp_node::create_router(engine.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "management API stopped");
                }
            }))
        }
        None => None,
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown requested");

    engine.shutdown().await;
    if let Some(server) = server {
        server.abort();
    }
    Ok(())
}

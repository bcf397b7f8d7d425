use crate::engine::DiameterEngine;
use cdp_config::AcceptorEntry;
use cdp_core::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

const DEFAULT_BIND: &str = "0.0.0.0";

/// Bind the listen socket of one acceptor
pub(crate) async fn bind(entry: &AcceptorEntry) -> Result<TcpListener> {
    let host = entry.bind.as_deref().unwrap_or(DEFAULT_BIND);
    let listener = TcpListener::bind((host, entry.port)).await?;
    info!(addr = %listener.local_addr()?, "diameter acceptor listening");
    Ok(listener)
}

/// Accept loop; every connection is handed to the engine until shutdown
pub(crate) async fn run(engine: Arc<DiameterEngine>, listener: TcpListener) {
    let shutdown = engine.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    debug!(remote = %addr, "new inbound connection");
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!(remote = %addr, error = %e, "TCP_NODELAY not set");
                    }
                    engine.accept_transport(socket);
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
        }
    }
    debug!("acceptor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let entry = AcceptorEntry {
            port: 0,
            bind: Some("127.0.0.1".into()),
        };
        let listener = bind(&entry).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_foreign_address_fails() {
        let entry = AcceptorEntry {
            port: 0,
            bind: Some("192.0.2.1".into()),
        };
        assert!(bind(&entry).await.is_err());
    }
}

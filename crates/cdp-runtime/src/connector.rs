//! Outbound connection establishment.

use crate::engine::DiameterEngine;
use async_trait::async_trait;
use cdp_core::{CdpError, Result, Transport};
use dashmap::DashMap;
use socket2::{SockRef, TcpKeepalive};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

/// Where to dial a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTarget {
    pub fqdn: String,
    pub port: u16,
    /// Local address to bind before connecting
    pub src_addr: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &PeerTarget) -> Result<Box<dyn Transport>>;
}

/// Dials peers over TCP
pub struct TcpConnector {
    keepalive: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            keepalive: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_keepalive(keepalive: Option<Duration>) -> Self {
        Self { keepalive }
    }

    async fn connect_addr(&self, addr: SocketAddr, src_addr: Option<&str>) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(src) = src_addr {
            let ip: IpAddr = src
                .parse()
                .map_err(|_| CdpError::ConfigError(format!("invalid source address {src}")))?;
            socket.bind(SocketAddr::new(ip, 0))?;
        }

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;
        if let Some(time) = self.keepalive {
            SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(time))?;
        }
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &PeerTarget) -> Result<Box<dyn Transport>> {
        let mut last_error = None;
        for addr in lookup_host((target.fqdn.as_str(), target.port)).await? {
            match self.connect_addr(addr, target.src_addr.as_deref()).await {
                Ok(stream) => return Ok(Box::new(stream)),
                Err(e) => {
                    debug!(peer = %target.fqdn, %addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CdpError::PeerUnavailable(format!("{} did not resolve", target.fqdn))
        }))
    }
}

/// In-process network: engines register under their FQDN and dial each
/// other over `tokio::io::duplex` pipes.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: DashMap<String, Weak<DiameterEngine>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Accept connections addressed to `fqdn` on `engine`
    pub fn register(&self, fqdn: &str, engine: &Arc<DiameterEngine>) {
        self.nodes
            .insert(fqdn.to_ascii_lowercase(), Arc::downgrade(engine));
    }

    pub fn unregister(&self, fqdn: &str) {
        self.nodes.remove(&fqdn.to_ascii_lowercase());
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            network: self.clone(),
        })
    }
}

pub struct MemoryConnector {
    network: Arc<MemoryNetwork>,
}

const MEMORY_PIPE_SIZE: usize = 64 * 1024;

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &PeerTarget) -> Result<Box<dyn Transport>> {
        let engine = self
            .network
            .nodes
            .get(&target.fqdn.to_ascii_lowercase())
            .and_then(|node| node.upgrade())
            .ok_or_else(|| CdpError::PeerUnavailable(format!("{} refused connection", target.fqdn)))?;

        let (local, remote) = tokio::io::duplex(MEMORY_PIPE_SIZE);
        engine.accept_transport(remote);
        Ok(Box::new(local))
    }
}

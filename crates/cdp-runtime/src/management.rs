//! Operator surface: peer listing and enablement, statistics, routing
//! reload and orderly shutdown.

use crate::engine::DiameterEngine;
use crate::registry::PeerInput;
use cdp_config::RoutingConfig;
use cdp_core::{Application, CdpError, Result};
use cdp_peer_core::{PeerEvent, PeerState};
use cdp_router_core::RoutingTable;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long shutdown waits for DPA from the peers it disconnects
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub fqdn: String,
    pub realm: String,
    pub state: PeerState,
    pub disabled: bool,
    pub is_dynamic: bool,
    pub last_selected_at: Option<DateTime<Utc>>,
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub request_timeouts: u64,
    pub replies_received: u64,
    pub replies_response_time_ms: u64,
    /// Milliseconds, 0 before the first reply
    pub average_response_time: u64,
    pub queue_length: usize,
    pub peers_open: i64,
    pub sessions: usize,
    pub pending_transactions: usize,
}

impl DiameterEngine {
    pub fn list_peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .peers
            .all()
            .iter()
            .map(|entry| {
                let peer = entry.peer.lock();
                PeerInfo {
                    fqdn: peer.fqdn.clone(),
                    realm: peer.realm.clone(),
                    state: peer.state,
                    disabled: peer.disabled,
                    is_dynamic: peer.is_dynamic,
                    last_selected_at: peer.last_selected_at.map(DateTime::<Utc>::from),
                    applications: peer.applications.clone(),
                }
            })
            .collect();
        peers.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        peers
    }

    /// Let the router pick the peer again and allow reconnects
    pub fn enable_peer(&self, fqdn: &str) -> Result<()> {
        self.set_disabled(fqdn, false)
    }

    /// Keep the router away from the peer. The peer timer disconnects an
    /// open peer with DPR and stops reconnecting.
    pub fn disable_peer(&self, fqdn: &str) -> Result<()> {
        self.set_disabled(fqdn, true)
    }

    fn set_disabled(&self, fqdn: &str, disabled: bool) -> Result<()> {
        let entry = self
            .peers
            .get(fqdn)
            .ok_or_else(|| CdpError::PeerUnavailable(format!("unknown peer {fqdn}")))?;
        entry.peer.lock().disabled = disabled;
        info!(peer = %entry.fqdn, disabled, "peer enablement changed");
        Ok(())
    }

    pub fn statistics(&self) -> Statistics {
        let m = &self.metrics;
        Statistics {
            request_timeouts: m.request_timeouts.get(),
            replies_received: m.replies_received.get(),
            replies_response_time_ms: m.replies_response_time_ms.get(),
            average_response_time: m.average_response_time(),
            queue_length: self.queue.len(),
            peers_open: m.peers_open.get(),
            sessions: self.sessions.len(),
            pending_transactions: self.transactions.len(),
        }
    }

    /// Swap in a new routing table. Requests already routed are not
    /// affected.
    pub fn reload_routing(&self, routing: &RoutingConfig) {
        let table = RoutingTable::from_config(routing);
        let referenced = routing
            .realms
            .iter()
            .flat_map(|r| r.routes.iter())
            .chain(routing.default_routes.iter());
        for route in referenced {
            if self.peers.get(&route.fqdn).is_none() {
                warn!(peer = %route.fqdn, "route points at an unknown peer");
            }
        }
        info!(realms = table.realms().count(), "routing table reloaded");
        self.routing.store(Arc::new(table));
    }

    /// Disconnect the open peers with DPR, then stop every task of the
    /// engine. Pending transactions fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        if self.is_shutting_down() {
            return;
        }
        info!(fqdn = %self.config.fqdn, "diameter engine shutting down");

        let open: Vec<_> = self.peers.all().into_iter().filter(|e| e.is_open()).collect();
        for entry in &open {
            entry.send(PeerInput::Event(PeerEvent::Stop));
        }
        if !open.is_empty() {
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            while Instant::now() < deadline && open.iter().any(|e| disconnecting(e.peer.lock().state)) {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        }

        self.shutdown.cancel();
        self.queue.close();
        self.transactions.fail_all();
        info!(fqdn = %self.config.fqdn, "diameter engine stopped");
    }
}

fn disconnecting(state: PeerState) -> bool {
    state.is_open() || state == PeerState::Closing
}

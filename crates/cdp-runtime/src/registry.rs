//! Registry of known peers. Each peer record sits behind its own lock and
//! is driven by one actor task fed through `tx`.

use cdp_core::DiameterMessage;
use cdp_peer_core::{ConnId, Peer, PeerEvent};
use cdp_router_core::{Candidate, PeerDirectory};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Input of a peer actor
#[derive(Debug)]
pub enum PeerInput {
    Event(PeerEvent),
    /// A message arrived on one of the peer's connections
    Received { conn: ConnId, msg: DiameterMessage },
    /// The remote side closed the connection or it failed
    Closed { conn: ConnId },
}

pub struct PeerEntry {
    pub fqdn: String,
    pub(crate) peer: Mutex<Peer>,
    tx: mpsc::UnboundedSender<PeerInput>,
    pub(crate) stop: CancellationToken,
}

impl PeerEntry {
    pub(crate) fn new(
        peer: Peer,
        tx: mpsc::UnboundedSender<PeerInput>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            fqdn: peer.fqdn.clone(),
            peer: Mutex::new(peer),
            tx,
            stop,
        }
    }

    /// Queue an input for the actor. False once the actor is gone.
    pub(crate) fn send(&self, input: PeerInput) -> bool {
        self.tx.send(input).is_ok()
    }

    /// Copy of the peer record
    pub fn snapshot(&self) -> Peer {
        self.peer.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.peer.lock().is_open()
    }
}

#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<Arc<PeerEntry>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive lookup by FQDN
    pub fn get(&self, fqdn: &str) -> Option<Arc<PeerEntry>> {
        self.peers
            .read()
            .iter()
            .find(|e| e.fqdn.eq_ignore_ascii_case(fqdn))
            .cloned()
    }

    /// Insert `entry` unless a peer with the same FQDN exists. Returns the
    /// registered entry and whether it is the new one.
    pub fn insert(&self, entry: Arc<PeerEntry>) -> (Arc<PeerEntry>, bool) {
        let mut peers = self.peers.write();
        if let Some(existing) = peers.iter().find(|e| e.fqdn.eq_ignore_ascii_case(&entry.fqdn)) {
            return (existing.clone(), false);
        }
        peers.push(entry.clone());
        (entry, true)
    }

    pub fn remove(&self, fqdn: &str) -> Option<Arc<PeerEntry>> {
        let mut peers = self.peers.write();
        let idx = peers.iter().position(|e| e.fqdn.eq_ignore_ascii_case(fqdn))?;
        Some(peers.remove(idx))
    }

    /// Snapshot of the registered entries, in registration order
    pub fn all(&self) -> Vec<Arc<PeerEntry>> {
        self.peers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl PeerDirectory for PeerRegistry {
    fn candidate(&self, fqdn: &str, app_id: u32, vendor_id: u32) -> Option<Candidate> {
        let entry = self.get(fqdn)?;
        let peer = entry.peer.lock();
        Some(Candidate {
            open: peer.is_open(),
            disabled: peer.disabled,
            supports: peer.handles_application(app_id, vendor_id),
            last_selected: peer.last_selected,
        })
    }
}

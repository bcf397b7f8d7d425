//! The engine context: everything the acceptors, connections, peer actors,
//! workers and timers share.

use crate::acceptor;
use crate::api::Handlers;
use crate::connection::{self, ConnHandle};
use crate::connector::{Connector, TcpConnector};
use crate::ids::IdGenerator;
use crate::peer_actor::PeerActor;
use crate::queue::TaskQueue;
use crate::registry::{PeerEntry, PeerInput, PeerRegistry};
use crate::timer::TimerFacility;
use crate::transaction::TransactionManager;
use crate::worker;
use arc_swap::ArcSwap;
use cdp_config::DiameterConfig;
use cdp_core::{ApplicationKind, CdpError, DiameterMessage, Result, Transport};
use cdp_dict::DictionaryManager;
use cdp_metrics::CdpMetrics;
use cdp_peer_core::{capabilities, ConnId, LocalNode, Peer, PeerTimers, TimerDecision};
use cdp_router_core::RoutingTable;
use cdp_session_core::{SessionContext, SessionTable};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outbound messages a connection buffers before sends are refused
pub(crate) const CONNECTION_SEND_BUFFER: usize = 256;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct DiameterEngine {
    pub(crate) config: DiameterConfig,
    pub(crate) local: LocalNode,
    pub(crate) peers: PeerRegistry,
    pub(crate) connections: DashMap<ConnId, ConnHandle>,
    next_conn: AtomicU64,
    pub(crate) queue: TaskQueue,
    pub(crate) transactions: TransactionManager,
    pub(crate) sessions: SessionTable,
    pub(crate) routing: ArcSwap<RoutingTable>,
    pub(crate) handlers: Handlers,
    pub(crate) metrics: Arc<CdpMetrics>,
    pub(crate) dictionary: DictionaryManager,
    pub(crate) timers: Arc<TimerFacility>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) ids: IdGenerator,
    pub(crate) connector: Arc<dyn Connector>,
    /// Clock of the load balancer
    pub(crate) selections: AtomicU64,
}

fn local_node(config: &DiameterConfig) -> LocalNode {
    LocalNode {
        fqdn: config.fqdn.clone(),
        realm: config.realm.clone(),
        vendor_id: config.vendor_id,
        product_name: config.product_name.clone(),
        applications: config.applications.clone(),
        supported_vendors: config.supported_vendors.clone(),
    }
}

impl DiameterEngine {
    /// Engine dialling its peers over TCP
    pub fn new(config: DiameterConfig) -> Result<Arc<Self>> {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    pub fn with_connector(config: DiameterConfig, connector: Arc<dyn Connector>) -> Result<Arc<Self>> {
        let metrics = Arc::new(
            CdpMetrics::new().map_err(|e| CdpError::InternalError(format!("metrics: {e}")))?,
        );

        let dictionary = DictionaryManager::new();
        for path in &config.dictionaries {
            let loaded = dictionary
                .load_file(path)
                .map_err(|e| CdpError::ConfigError(format!("dictionary {path}: {e}")))?;
            info!(path = %path, avps = loaded, "dictionary loaded");
        }

        let shutdown = CancellationToken::new();
        let queue = TaskQueue::new(
            config.queue_length,
            Duration::from_millis(config.queue_put_warn_ms),
            shutdown.clone(),
        )
        .with_metrics(metrics.clone());

        let auth_apps = config.applications_of(ApplicationKind::Auth).count();
        let acct_apps = config.applications_of(ApplicationKind::Acct).count();
        info!(
            fqdn = %config.fqdn,
            realm = %config.realm,
            auth_applications = auth_apps,
            acct_applications = acct_apps,
            "diameter engine created"
        );

        Ok(Arc::new(Self {
            local: local_node(&config),
            peers: PeerRegistry::new(),
            connections: DashMap::new(),
            next_conn: AtomicU64::new(1),
            queue,
            transactions: TransactionManager::new(),
            sessions: SessionTable::new(config.sessions_hash_size, config.identity()),
            routing: ArcSwap::from_pointee(RoutingTable::from_config(&config.routing)),
            handlers: Handlers::default(),
            metrics,
            dictionary,
            timers: Arc::new(TimerFacility::new(Duration::from_millis(config.timer_resolution_ms))),
            shutdown,
            ids: IdGenerator::new(),
            connector,
            selections: AtomicU64::new(0),
            config,
        }))
    }

    /// Register the configured peers, spawn the workers and the timer, and
    /// start listening. Returns the bound listen addresses.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<SocketAddr>> {
        let mut listeners = Vec::with_capacity(self.config.acceptors.len());
        for entry in &self.config.acceptors {
            listeners.push(acceptor::bind(entry).await?);
        }

        for entry in &self.config.peers {
            let mut peer = Peer::new(&entry.fqdn, &entry.realm, entry.port);
            peer.src_addr = entry.src_addr.clone();
            self.add_peer(peer);
        }

        for id in 0..self.config.workers {
            tokio::spawn(worker::run(self.clone(), id));
        }

        self.register_timers();
        tokio::spawn(self.timers.clone().run(self.shutdown.clone()));

        let mut addrs = Vec::with_capacity(listeners.len());
        for listener in listeners {
            addrs.push(listener.local_addr()?);
            tokio::spawn(acceptor::run(self.clone(), listener));
        }

        info!(
            fqdn = %self.config.fqdn,
            peers = self.peers.len(),
            workers = self.config.workers,
            listen = ?addrs,
            "diameter engine started"
        );
        Ok(addrs)
    }

    pub fn config(&self) -> &DiameterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<CdpMetrics> {
        &self.metrics
    }

    pub fn dictionary(&self) -> &DictionaryManager {
        &self.dictionary
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn timers(&self) -> &Arc<TimerFacility> {
        &self.timers
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Environment for one session state machine step
    pub(crate) fn session_ctx(&self) -> SessionContext<'_> {
        SessionContext {
            origin_host: &self.config.fqdn,
            origin_realm: &self.config.realm,
            default_auth_session_timeout: self.config.default_auth_session_timeout,
            max_auth_session_timeout: self.config.max_auth_session_timeout,
            now: chrono::Utc::now().timestamp(),
            ids: &self.ids,
        }
    }

    pub(crate) fn peer_timers(&self) -> PeerTimers {
        PeerTimers {
            tc: Duration::from_secs(self.config.tc_secs),
            watchdog: Duration::from_secs(self.config.watchdog_interval_secs),
            drop_unknown: self.config.drop_unknown_on_disconnect,
        }
    }

    /// Register a peer and spawn its actor. An existing peer with the same
    /// FQDN wins.
    pub(crate) fn add_peer(self: &Arc<Self>, peer: Peer) -> Arc<PeerEntry> {
        let (tx, rx) = mpsc::unbounded_channel();
        let candidate = Arc::new(PeerEntry::new(peer, tx, self.shutdown.child_token()));
        let (entry, inserted) = self.peers.insert(candidate);
        if inserted {
            debug!(peer = %entry.fqdn, "peer registered");
            tokio::spawn(PeerActor::new(self.clone(), entry.clone(), rx).run());
        }
        entry
    }

    pub(crate) fn remove_peer(&self, fqdn: &str) {
        if let Some(entry) = self.peers.remove(fqdn) {
            info!(peer = %entry.fqdn, "peer removed");
            entry.stop.cancel();
        }
    }

    /// Allocate an id for a new connection and register its outbound queue
    pub(crate) fn register_connection<T: Transport>(
        &self,
        stream: &T,
    ) -> (ConnId, mpsc::Receiver<DiameterMessage>) {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let local_ips: Vec<IpAddr> = stream.local_addr().map(|a| vec![a.ip()]).unwrap_or_default();
        let (tx, rx) = mpsc::channel(CONNECTION_SEND_BUFFER);
        self.connections.insert(conn, ConnHandle { tx, local_ips });
        (conn, rx)
    }

    /// Take over an inbound connection from a not yet identified peer
    pub fn accept_transport<T: Transport + 'static>(self: &Arc<Self>, stream: T) {
        if self.is_shutting_down() {
            return;
        }
        let (conn, rx) = self.register_connection(&stream);
        debug!(conn, "inbound connection accepted");
        tokio::spawn(connection::run(self.clone(), conn, stream, rx, None));
    }

    /// Queue `msg` on a connection. A full queue drops the message.
    pub(crate) fn send_on(&self, conn: ConnId, msg: DiameterMessage) -> Result<()> {
        let tx = self
            .connections
            .get(&conn)
            .map(|h| h.tx.clone())
            .ok_or_else(|| CdpError::PeerUnavailable(format!("connection {conn} is gone")))?;
        tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(conn, "connection send queue full, message dropped");
                CdpError::OutOfResources(format!("send queue of connection {conn} is full"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                CdpError::PeerUnavailable(format!("connection {conn} is closed"))
            }
        })
    }

    /// Close a connection after its queued messages are written
    pub(crate) fn close_connection(&self, conn: ConnId) {
        if self.connections.remove(&conn).is_some() {
            debug!(conn, "connection closed locally");
        }
    }

    pub(crate) fn local_ips(&self, conn: ConnId) -> Vec<IpAddr> {
        self.connections
            .get(&conn)
            .map(|h| h.local_ips.clone())
            .unwrap_or_default()
    }

    fn register_timers(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        self.timers
            .add(self.timers.resolution(), false, move || with_engine(&engine, Self::check_peers));

        let engine = Arc::downgrade(self);
        self.timers.add(self.timers.resolution(), false, move || {
            with_engine(&engine, |e| {
                let fired = e.transactions.sweep(Instant::now());
                if fired > 0 {
                    e.metrics.request_timeouts.inc_by(fired as u64);
                }
            })
        });

        let engine = Arc::downgrade(self);
        self.timers.add(SESSION_SWEEP_INTERVAL, false, move || {
            with_engine(&engine, |e| {
                let actions = e.sessions.sweep(&e.session_ctx());
                e.execute_session_actions(actions);
            })
        });
    }

    /// Periodic peer check: reconnects, handshake timeouts, watchdogs and
    /// removal of closed dynamic peers
    fn check_peers(self: &Arc<Self>) {
        let timers = self.peer_timers();
        let now = Instant::now();
        for entry in self.peers.all() {
            let decision = entry.peer.lock().timer_check(now, &timers);
            match decision {
                TimerDecision::Nothing => {}
                TimerDecision::Event(event) => {
                    entry.send(PeerInput::Event(event));
                }
                TimerDecision::SendDwr { conn } => {
                    let (hbh, e2e) = (self.ids.next_hop_by_hop(), self.ids.next_end_to_end());
                    let dwr = capabilities::build_dwr(&self.local, hbh, e2e);
                    if let Err(e) = self.send_on(conn, dwr) {
                        debug!(peer = %entry.fqdn, error = %e, "watchdog not sent");
                    }
                }
                TimerDecision::Remove => self.remove_peer(&entry.fqdn),
            }
        }
    }
}

fn with_engine(engine: &Weak<DiameterEngine>, f: impl FnOnce(&Arc<DiameterEngine>)) {
    if let Some(engine) = engine.upgrade() {
        f(&engine);
    }
}

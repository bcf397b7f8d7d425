use crate::connection;
use crate::connector::PeerTarget;
use crate::engine::DiameterEngine;
use crate::queue::Task;
use crate::registry::{PeerEntry, PeerInput};
use cdp_core::DiameterMessage;
use cdp_peer_core::{capabilities, ConnId, Peer, PeerAction, PeerEvent, PeerState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Runs the state machine of one peer. Inputs are handled strictly in
/// arrival order; the peer lock is only held while stepping.
pub(crate) struct PeerActor {
    engine: Arc<DiameterEngine>,
    entry: Arc<PeerEntry>,
    inputs: mpsc::UnboundedReceiver<PeerInput>,
}

impl PeerActor {
    pub(crate) fn new(
        engine: Arc<DiameterEngine>,
        entry: Arc<PeerEntry>,
        inputs: mpsc::UnboundedReceiver<PeerInput>,
    ) -> Self {
        Self {
            engine,
            entry,
            inputs,
        }
    }

    pub(crate) async fn run(mut self) {
        let stop = self.entry.stop.clone();
        loop {
            let input = tokio::select! {
                _ = stop.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };
            self.handle(input).await;
        }
        debug!(peer = %self.entry.fqdn, "peer actor stopped");
    }

    async fn handle(&mut self, input: PeerInput) {
        let result = {
            let mut peer = self.entry.peer.lock();
            let event = match input {
                PeerInput::Event(event) => Some(event),
                PeerInput::Received { conn, msg } => match peer.side_of(conn) {
                    Some(side) => Some(peer.receive_event(side, msg)),
                    None => {
                        debug!(peer = %peer.fqdn, conn, "message on a stale connection dropped");
                        None
                    }
                },
                PeerInput::Closed { conn } => peer.side_of(conn).map(Peer::disconnect_event),
            };
            event.map(|event| peer.step(event, &self.engine.local, Instant::now()))
        };

        match result {
            Some(Ok(actions)) => self.execute(actions).await,
            // already logged by the state machine; the peer keeps its state
            Some(Err(_)) | None => {}
        }
    }

    async fn execute(&self, actions: Vec<PeerAction>) {
        let engine = &self.engine;
        for action in actions {
            match action {
                PeerAction::Connect => self.connect(),
                PeerAction::SendCer { conn } => {
                    let (hbh, e2e) = self.next_ids();
                    let cer = capabilities::build_cer(&engine.local, &engine.local_ips(conn), hbh, e2e);
                    self.send(conn, cer);
                }
                PeerAction::SendCea {
                    conn,
                    cer,
                    result_code,
                } => {
                    let cea = capabilities::build_cea(
                        &engine.local,
                        &cer,
                        result_code,
                        &engine.local_ips(conn),
                    );
                    self.send(conn, cea);
                }
                PeerAction::SendDwr { conn } => {
                    let (hbh, e2e) = self.next_ids();
                    self.send(conn, capabilities::build_dwr(&engine.local, hbh, e2e));
                }
                PeerAction::SendDwa {
                    conn,
                    dwr,
                    result_code,
                } => self.send(conn, capabilities::build_dwa(&engine.local, &dwr, result_code)),
                PeerAction::SendDpr { conn } => {
                    let (hbh, e2e) = self.next_ids();
                    self.send(conn, capabilities::build_dpr(&engine.local, hbh, e2e));
                }
                PeerAction::SendDpa {
                    conn,
                    dpr,
                    result_code,
                } => self.send(conn, capabilities::build_dpa(&engine.local, &dpr, result_code)),
                PeerAction::Send { conn, msg } => self.send(conn, msg),
                PeerAction::Close { conn } => engine.close_connection(conn),
                PeerAction::Deliver(msg) => {
                    let task = Task {
                        peer: self.entry.fqdn.clone(),
                        msg,
                    };
                    if let Err(e) = engine.queue.put(task).await {
                        debug!(peer = %self.entry.fqdn, error = %e, "message not queued");
                    }
                }
                PeerAction::StateChanged { from, to } => {
                    info!(peer = %self.entry.fqdn, from = %from, to = %to, "peer state changed");
                    self.track_open(from, to);
                }
            }
        }
    }

    fn next_ids(&self) -> (u32, u32) {
        (
            self.engine.ids.next_hop_by_hop(),
            self.engine.ids.next_end_to_end(),
        )
    }

    fn send(&self, conn: ConnId, msg: DiameterMessage) {
        let command = msg.command_code();
        if let Err(e) = self.engine.send_on(conn, msg) {
            warn!(peer = %self.entry.fqdn, conn, command, error = %e, "send failed");
        }
    }

    fn track_open(&self, from: PeerState, to: PeerState) {
        let gauge = &self.engine.metrics.peers_open;
        match (from.is_open(), to.is_open()) {
            (false, true) => gauge.inc(),
            (true, false) => gauge.dec(),
            _ => {}
        }
    }

    /// Dial the peer in the background and report the outcome as
    /// IRcvConnAck / IRcvConnNAck
    fn connect(&self) {
        let engine = self.engine.clone();
        let entry = self.entry.clone();
        let target = {
            let peer = entry.peer.lock();
            PeerTarget {
                fqdn: peer.fqdn.clone(),
                port: peer.port,
                src_addr: peer.src_addr.clone(),
            }
        };

        tokio::spawn(async move {
            let timeout = Duration::from_secs(engine.config.connect_timeout_secs);
            let dialled = tokio::time::timeout(timeout, engine.connector.connect(&target)).await;
            match dialled {
                Ok(Ok(stream)) => {
                    let (conn, outbound) = engine.register_connection(&stream);
                    debug!(peer = %target.fqdn, conn, "connected");
                    entry.send(PeerInput::Event(PeerEvent::IRcvConnAck { conn }));
                    connection::run(engine, conn, stream, outbound, Some(entry)).await;
                }
                Ok(Err(e)) => {
                    warn!(peer = %target.fqdn, port = target.port, error = %e, "connect failed");
                    entry.send(PeerInput::Event(PeerEvent::IRcvConnNAck));
                }
                Err(_) => {
                    warn!(peer = %target.fqdn, port = target.port, "connect timed out");
                    entry.send(PeerInput::Event(PeerEvent::IRcvConnNAck));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::connector::{Connector, MockConnector};
    use crate::engine::DiameterEngine;
    use cdp_config::DiameterConfig;
    use cdp_config::PeerEntry as PeerConfig;
    use cdp_core::CdpError;
    use cdp_peer_core::PeerState;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> DiameterConfig {
        let mut config = DiameterConfig::new("scscf.ims.test", "ims.test");
        config.peers.push(PeerConfig {
            fqdn: "hss.ims.test".into(),
            realm: "ims.test".into(),
            port: 3869,
            src_addr: None,
        });
        config.timer_resolution_ms = 10;
        config.tc_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_closed_and_retries() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|target| target.fqdn == "hss.ims.test" && target.port == 3869)
            .times(2..)
            .returning(|_| Err(CdpError::PeerUnavailable("refused".into())));
        let connector: Arc<dyn Connector> = Arc::new(connector);

        let engine = DiameterEngine::with_connector(config(), connector).unwrap();
        engine.start().await.unwrap();

        // first attempt right away, the retry after Tc
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let peer = engine.peers.get("hss.ims.test").unwrap().snapshot();
        assert!(matches!(peer.state, PeerState::Closed | PeerState::WaitConnAck));
        assert_eq!(peer.i_conn, None);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_connected_peer_sends_cer() {
        let (client, mut server) = tokio::io::duplex(4096);
        let client = std::sync::Mutex::new(Some(client));
        let mut connector = MockConnector::new();
        connector.expect_connect().returning(move |_| {
            client
                .lock()
                .unwrap()
                .take()
                .map(|c| Box::new(c) as Box<dyn cdp_core::Transport>)
                .ok_or_else(|| CdpError::PeerUnavailable("only one connection".into()))
        });

        let engine = DiameterEngine::with_connector(config(), Arc::new(connector)).unwrap();
        engine.start().await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut header = [0u8; 20];
        server.read_exact(&mut header).await.unwrap();
        assert_eq!(header[4] & 0x80, 0x80);
        assert_eq!(u32::from_be_bytes([0, header[5], header[6], header[7]]), 257);

        let peer = engine.peers.get("hss.ims.test").unwrap().snapshot();
        assert_eq!(peer.state, PeerState::WaitICEA);
        assert!(peer.i_conn.is_some());
        engine.shutdown().await;
    }
}

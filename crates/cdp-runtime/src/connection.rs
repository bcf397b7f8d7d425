//! One task per transport connection: frames inbound bytes into messages
//! for the owning peer actor and writes the messages queued for it.

use crate::engine::DiameterEngine;
use crate::registry::{PeerEntry, PeerInput};
use cdp_core::{DiameterCodec, DiameterMessage, Transport};
use cdp_dict::command;
use cdp_peer_core::{ConnId, Peer, PeerEvent};
use futures::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};

/// The engine's side of a connection task
pub(crate) struct ConnHandle {
    pub tx: mpsc::Sender<DiameterMessage>,
    /// Advertised as Host-IP-Address in capabilities exchange
    pub local_ips: Vec<IpAddr>,
}

/// Why the read/write loop ended
enum Ending {
    /// The engine dropped the handle; nothing to report
    Local,
    /// EOF or I/O failure; the peer actor is told
    Remote,
    /// First message from an unknown host was not acceptable
    Rejected,
}

/// Drive `stream` until it closes. `peer` is known for connections we
/// dialled; inbound connections learn it from their first CER.
pub(crate) async fn run<T: Transport + 'static>(
    engine: Arc<DiameterEngine>,
    conn: ConnId,
    stream: T,
    mut outbound: mpsc::Receiver<DiameterMessage>,
    mut peer: Option<Arc<PeerEntry>>,
) {
    let max_length = engine.config.max_message_length;
    let (read, write) = tokio::io::split(stream);
    let mut frames = FramedRead::new(read, DiameterCodec::new(max_length));
    let mut sink = FramedWrite::new(write, DiameterCodec::new(max_length));
    let shutdown = engine.shutdown.clone();

    let ending = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ending::Local,
            frame = frames.next() => match frame {
                Some(Ok(bytes)) => {
                    let mut msg = match DiameterMessage::decode_bytes(bytes) {
                        Ok(msg) => msg,
                        Err(e) => {
                            engine.metrics.malformed_messages.inc();
                            warn!(conn, error = %e, "malformed message dropped");
                            continue;
                        }
                    };
                    engine.metrics.messages_received.inc();
                    if tracing::enabled!(tracing::Level::TRACE) {
                        tracing::trace!(conn, "received\n{}", msg.dump(&engine.dictionary));
                    }

                    match &peer {
                        Some(entry) => {
                            msg.origin_peer = Some(entry.fqdn.clone());
                            entry.send(PeerInput::Received { conn, msg });
                        }
                        None => match identify(&engine, conn, msg) {
                            Some(entry) => peer = Some(entry),
                            None => break Ending::Rejected,
                        },
                    }
                }
                Some(Err(e)) => {
                    error!(conn, error = %e, "connection read failed");
                    break Ending::Remote;
                }
                None => {
                    debug!(conn, "connection closed by remote");
                    break Ending::Remote;
                }
            },
            queued = outbound.recv() => match queued {
                Some(msg) => {
                    let command = msg.command_code();
                    if let Err(e) = sink.send(msg).await {
                        error!(conn, command, error = %e, "connection write failed");
                        break Ending::Remote;
                    }
                    engine.metrics.messages_sent.inc();
                }
                None => break Ending::Local,
            },
        }
    };

    engine.connections.remove(&conn);
    match (ending, peer) {
        (Ending::Remote, Some(entry)) => {
            entry.send(PeerInput::Closed { conn });
        }
        (Ending::Rejected, _) => debug!(conn, "inbound connection rejected"),
        _ => {}
    }
}

/// Resolve the peer behind a new inbound connection from its first
/// message, which has to be a CER. Unknown hosts become dynamic peers
/// when the engine accepts them.
fn identify(
    engine: &Arc<DiameterEngine>,
    conn: ConnId,
    mut cer: DiameterMessage,
) -> Option<Arc<PeerEntry>> {
    if cer.command_code() != command::CAPABILITIES_EXCHANGE || !cer.is_request() {
        warn!(conn, command = cer.command_code(), "first message of inbound connection is not a CER");
        return None;
    }
    let Some(host) = cer.origin_host() else {
        warn!(conn, "CER without Origin-Host");
        return None;
    };

    let entry = match engine.peers.get(&host) {
        Some(entry) => entry,
        None if engine.config.accept_unknown_peers => {
            let realm = cer.origin_realm().unwrap_or_default();
            debug!(conn, peer = %host, realm = %realm, "accepting unknown peer");
            engine.add_peer(Peer::new_dynamic(&host, realm, 0))
        }
        None => {
            warn!(conn, peer = %host, "CER from unknown peer refused");
            return None;
        }
    };

    cer.origin_peer = Some(entry.fqdn.clone());
    entry.send(PeerInput::Event(PeerEvent::RConnCer { conn, cer }));
    Some(entry)
}

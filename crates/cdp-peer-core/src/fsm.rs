//! Peer state machine (RFC 6733 section 5.6).
//!
//! `Peer::step` is pure: it updates the record and returns the actions the
//! runtime must carry out. Connection identifiers are assigned by the
//! runtime; the machine only tracks which one is the initiator side and
//! which one is the receiver side.

use crate::capabilities::{elect, process_cea, process_cer};
use crate::peer::Peer;
use crate::types::{ConnId, LocalNode, PeerAction, PeerEvent, PeerState, Side};
use cdp_core::{CdpError, DiameterMessage, Result};
use cdp_dict::result_code;
use std::time::Instant;
use tracing::{debug, warn};

impl Peer {
    /// Apply one event. Events that are not valid in the current state are
    /// rejected with `ProtocolError` and leave the peer unchanged.
    pub fn step(
        &mut self,
        event: PeerEvent,
        local: &LocalNode,
        now: Instant,
    ) -> Result<Vec<PeerAction>> {
        let from = self.state;
        let name = event.name();
        let mut actions = Vec::new();

        self.handle(event, local, now, &mut actions)?;

        if self.state != from {
            debug!(peer = %self.fqdn, event = name, from = %from, to = %self.state, "peer state changed");
            if self.state == PeerState::Closed {
                self.r_cer = None;
                self.waiting_dwa = false;
            }
            actions.push(PeerAction::StateChanged {
                from,
                to: self.state,
            });
        }
        Ok(actions)
    }

    fn handle(
        &mut self,
        event: PeerEvent,
        local: &LocalNode,
        now: Instant,
        actions: &mut Vec<PeerAction>,
    ) -> Result<()> {
        use PeerEvent as E;
        use PeerState as S;

        match (self.state, event) {
            // ---- Closed ----
            (S::Closed, E::Start) => {
                self.touch(now);
                self.state = S::WaitConnAck;
                actions.push(PeerAction::Connect);
            }
            (S::Closed, E::RConnCer { conn, cer }) => {
                self.r_conn = Some(conn);
                self.touch(now);
                self.answer_cer(conn, cer, local, actions);
            }

            // ---- Wait_Conn_Ack ----
            (S::WaitConnAck, E::IRcvConnAck { conn }) => {
                self.i_conn = Some(conn);
                self.touch(now);
                actions.push(PeerAction::SendCer { conn });
                self.state = S::WaitICEA;
            }
            (S::WaitConnAck, E::IRcvConnNAck) | (S::WaitConnAck, E::Timeout) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }
            (S::WaitConnAck, E::RConnCer { conn, cer }) => {
                self.r_conn = Some(conn);
                self.r_cer = Some(cer);
                self.touch(now);
                self.state = S::WaitConnAckElect;
            }

            // ---- Wait_I_CEA ----
            (S::WaitICEA, E::IRcvCea(cea)) => {
                self.touch(now);
                if result_code::is_success(process_cea(self, local, &cea)) {
                    self.state = S::IOpen;
                } else {
                    self.cleanup(actions);
                    self.state = S::Closed;
                }
            }
            (S::WaitICEA, E::RConnCer { conn, cer }) => {
                self.r_conn = Some(conn);
                self.touch(now);
                self.state = S::WaitReturns;
                if elect(&local.fqdn, &cer) {
                    self.r_cer = Some(cer);
                    self.handle(E::WinElection, local, now, actions)?;
                } else {
                    self.r_cer = Some(cer);
                }
            }
            (S::WaitICEA, E::IRcvNonCea(_))
            | (S::WaitICEA, E::IPeerDisc)
            | (S::WaitICEA, E::Timeout) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }

            // ---- Wait_Conn_Ack_Elect ----
            (S::WaitConnAckElect, E::IRcvConnAck { conn }) => {
                self.i_conn = Some(conn);
                self.touch(now);
                actions.push(PeerAction::SendCer { conn });
                self.state = S::WaitReturns;
                let won = self
                    .r_cer
                    .as_ref()
                    .map(|cer| elect(&local.fqdn, cer))
                    .unwrap_or(false);
                if won {
                    self.handle(E::WinElection, local, now, actions)?;
                }
            }
            (S::WaitConnAckElect, E::IRcvConnNAck) => {
                self.touch(now);
                self.answer_held_cer(local, actions);
            }
            (S::WaitConnAckElect, E::RPeerDisc) => {
                self.r_conn = None;
                self.r_cer = None;
                self.state = S::WaitConnAck;
            }
            (S::WaitConnAckElect, E::Timeout) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }

            // ---- Wait_Returns ----
            (S::WaitReturns, E::WinElection) => {
                self.disconnect(Side::Initiator, actions);
                self.answer_held_cer(local, actions);
            }
            (S::WaitReturns, E::IPeerDisc) => {
                self.i_conn = None;
                self.answer_held_cer(local, actions);
            }
            (S::WaitReturns, E::IRcvCea(cea)) => {
                self.disconnect(Side::Receiver, actions);
                self.r_cer = None;
                self.touch(now);
                if result_code::is_success(process_cea(self, local, &cea)) {
                    self.state = S::IOpen;
                } else {
                    self.cleanup(actions);
                    self.state = S::Closed;
                }
            }
            (S::WaitReturns, E::RPeerDisc) => {
                self.r_conn = None;
                self.r_cer = None;
                self.state = S::WaitICEA;
            }
            (S::WaitReturns, E::Timeout) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }

            // ---- Late inbound connections while another one is pending or open ----
            (S::WaitConnAckElect | S::WaitReturns | S::IOpen | S::ROpen | S::Closing, E::RConnCer { conn, .. }) => {
                debug!(peer = %self.fqdn, conn, "rejecting additional inbound connection");
                actions.push(PeerAction::Close { conn });
            }

            // ---- I_Open / R_Open ----
            (S::IOpen | S::ROpen, E::SendMessage(msg)) => {
                let conn = self.open_conn()?;
                actions.push(PeerAction::Send { conn, msg });
            }
            (S::IOpen, E::IRcvMessage(msg)) | (S::ROpen, E::RRcvMessage(msg)) => {
                self.touch(now);
                actions.push(PeerAction::Deliver(msg));
            }
            (S::IOpen, E::IRcvDwr(dwr)) | (S::ROpen, E::RRcvDwr(dwr)) => {
                self.touch(now);
                let conn = self.open_conn()?;
                actions.push(PeerAction::SendDwa {
                    conn,
                    dwr,
                    result_code: result_code::SUCCESS,
                });
            }
            (S::IOpen, E::IRcvDwa(_)) | (S::ROpen, E::RRcvDwa(_)) => {
                self.touch(now);
                self.waiting_dwa = false;
            }
            (S::IOpen, E::IRcvCer(cer)) | (S::ROpen, E::RRcvCer(cer)) => {
                self.touch(now);
                let conn = self.open_conn()?;
                let code = process_cer(self, local, &cer);
                actions.push(PeerAction::SendCea {
                    conn,
                    cer,
                    result_code: code,
                });
            }
            (S::IOpen, E::IRcvCea(cea)) | (S::ROpen, E::RRcvCea(cea)) => {
                self.touch(now);
                process_cea(self, local, &cea);
            }
            (S::IOpen | S::ROpen, E::Stop) => {
                let conn = self.open_conn()?;
                self.touch(now);
                actions.push(PeerAction::SendDpr { conn });
                self.state = S::Closing;
            }
            (S::IOpen, E::IRcvDpr(dpr)) | (S::ROpen, E::RRcvDpr(dpr)) => {
                let conn = self.open_conn()?;
                actions.push(PeerAction::SendDpa {
                    conn,
                    dpr,
                    result_code: result_code::SUCCESS,
                });
                self.cleanup(actions);
                self.state = S::Closed;
            }
            (S::IOpen, E::IPeerDisc) | (S::ROpen, E::RPeerDisc) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }

            // ---- Closing ----
            (S::Closing, E::IRcvDpa(_))
            | (S::Closing, E::RRcvDpa(_))
            | (S::Closing, E::IPeerDisc)
            | (S::Closing, E::RPeerDisc)
            | (S::Closing, E::Timeout) => {
                self.cleanup(actions);
                self.state = S::Closed;
            }
            (S::Closing, E::IRcvDpr(dpr)) | (S::Closing, E::RRcvDpr(dpr)) => {
                if let Some(conn) = self.active_conn() {
                    actions.push(PeerAction::SendDpa {
                        conn,
                        dpr,
                        result_code: result_code::SUCCESS,
                    });
                }
                self.cleanup(actions);
                self.state = S::Closed;
            }

            (state, event) => {
                warn!(peer = %self.fqdn, state = %state, event = event.name(), "invalid event for state");
                return Err(CdpError::ProtocolError(format!(
                    "{} not valid in state {}",
                    event.name(),
                    state
                )));
            }
        }
        Ok(())
    }

    /// Answer a CER received on the receiver connection and open or close
    /// depending on the outcome.
    fn answer_cer(
        &mut self,
        conn: ConnId,
        cer: DiameterMessage,
        local: &LocalNode,
        actions: &mut Vec<PeerAction>,
    ) {
        let code = process_cer(self, local, &cer);
        actions.push(PeerAction::SendCea {
            conn,
            cer,
            result_code: code,
        });
        if result_code::is_success(code) {
            self.state = PeerState::ROpen;
        } else {
            self.disconnect(Side::Receiver, actions);
            self.state = PeerState::Closed;
        }
    }

    /// Answer the CER held during the election on the receiver connection
    fn answer_held_cer(&mut self, local: &LocalNode, actions: &mut Vec<PeerAction>) {
        match (self.r_conn, self.r_cer.take()) {
            (Some(conn), Some(cer)) => self.answer_cer(conn, cer, local, actions),
            _ => {
                self.cleanup(actions);
                self.state = PeerState::Closed;
            }
        }
    }

    fn open_conn(&self) -> Result<ConnId> {
        self.active_conn()
            .ok_or_else(|| CdpError::InternalError(format!("peer {} open without connection", self.fqdn)))
    }

    fn disconnect(&mut self, side: Side, actions: &mut Vec<PeerAction>) {
        let conn = match side {
            Side::Initiator => self.i_conn.take(),
            Side::Receiver => self.r_conn.take(),
        };
        if let Some(conn) = conn {
            actions.push(PeerAction::Close { conn });
        }
    }

    /// Close both connections
    fn cleanup(&mut self, actions: &mut Vec<PeerAction>) {
        self.disconnect(Side::Initiator, actions);
        self.disconnect(Side::Receiver, actions);
    }
}

use crate::types::{ConnId, PeerEvent, PeerState, Side, TimerDecision};
use cdp_core::{Application, DiameterMessage};
use cdp_dict::{application, command};
use std::time::{Duration, Instant, SystemTime};

/// Periodic check intervals
#[derive(Debug, Clone, Copy)]
pub struct PeerTimers {
    /// Reconnect / handshake timeout
    pub tc: Duration,
    /// Idle time before a watchdog request
    pub watchdog: Duration,
    /// Remove dynamic peers once closed
    pub drop_unknown: bool,
}

/// A remote Diameter node and the state of its connections
#[derive(Debug, Clone)]
pub struct Peer {
    pub fqdn: String,
    pub realm: String,
    pub port: u16,
    pub src_addr: Option<String>,
    pub state: PeerState,
    /// Connection we opened
    pub i_conn: Option<ConnId>,
    /// Connection the peer opened
    pub r_conn: Option<ConnId>,
    /// CER held back while an election is pending
    pub r_cer: Option<DiameterMessage>,
    pub applications: Vec<Application>,
    pub last_activity: Option<Instant>,
    /// Selection ordinal used by the load balancer; 0 means never selected
    pub last_selected: u64,
    pub last_selected_at: Option<SystemTime>,
    pub disabled: bool,
    /// Learned from an inbound CER rather than configured
    pub is_dynamic: bool,
    pub waiting_dwa: bool,
}

impl Peer {
    pub fn new(fqdn: impl Into<String>, realm: impl Into<String>, port: u16) -> Self {
        Self {
            fqdn: fqdn.into(),
            realm: realm.into(),
            port,
            src_addr: None,
            state: PeerState::Closed,
            i_conn: None,
            r_conn: None,
            r_cer: None,
            applications: Vec::new(),
            last_activity: None,
            last_selected: 0,
            last_selected_at: None,
            disabled: false,
            is_dynamic: false,
            waiting_dwa: false,
        }
    }

    /// Peer created from an unsolicited CER
    pub fn new_dynamic(fqdn: impl Into<String>, realm: impl Into<String>, port: u16) -> Self {
        Self {
            is_dynamic: true,
            ..Self::new(fqdn, realm, port)
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Connection used for traffic in the current open state
    pub fn active_conn(&self) -> Option<ConnId> {
        match self.state {
            PeerState::IOpen => self.i_conn,
            PeerState::ROpen => self.r_conn,
            _ => self.i_conn.or(self.r_conn),
        }
    }

    /// Which of our connections `conn` is
    pub fn side_of(&self, conn: ConnId) -> Option<Side> {
        if self.i_conn == Some(conn) {
            Some(Side::Initiator)
        } else if self.r_conn == Some(conn) {
            Some(Side::Receiver)
        } else {
            None
        }
    }

    /// Whether the peer advertised the application, or relays everything
    pub fn handles_application(&self, app_id: u32, vendor_id: u32) -> bool {
        self.applications
            .iter()
            .any(|a| a.matches(app_id, vendor_id) || a.id == application::RELAY)
    }

    pub fn mark_selected(&mut self, ordinal: u64) {
        self.last_selected = ordinal;
        self.last_selected_at = Some(SystemTime::now());
    }

    /// Map a message received on one of our connections to a state machine
    /// event.
    pub fn receive_event(&self, side: Side, msg: DiameterMessage) -> PeerEvent {
        let request = msg.is_request();
        let initiator = side == Side::Initiator;

        if initiator && self.state == PeerState::WaitICEA {
            return if msg.command_code() == command::CAPABILITIES_EXCHANGE && !request {
                PeerEvent::IRcvCea(msg)
            } else {
                PeerEvent::IRcvNonCea(msg)
            };
        }

        match (msg.command_code(), request, initiator) {
            (command::CAPABILITIES_EXCHANGE, true, true) => PeerEvent::IRcvCer(msg),
            (command::CAPABILITIES_EXCHANGE, true, false) => PeerEvent::RRcvCer(msg),
            (command::CAPABILITIES_EXCHANGE, false, true) => PeerEvent::IRcvCea(msg),
            (command::CAPABILITIES_EXCHANGE, false, false) => PeerEvent::RRcvCea(msg),
            (command::DEVICE_WATCHDOG, true, true) => PeerEvent::IRcvDwr(msg),
            (command::DEVICE_WATCHDOG, true, false) => PeerEvent::RRcvDwr(msg),
            (command::DEVICE_WATCHDOG, false, true) => PeerEvent::IRcvDwa(msg),
            (command::DEVICE_WATCHDOG, false, false) => PeerEvent::RRcvDwa(msg),
            (command::DISCONNECT_PEER, true, true) => PeerEvent::IRcvDpr(msg),
            (command::DISCONNECT_PEER, true, false) => PeerEvent::RRcvDpr(msg),
            (command::DISCONNECT_PEER, false, true) => PeerEvent::IRcvDpa(msg),
            (command::DISCONNECT_PEER, false, false) => PeerEvent::RRcvDpa(msg),
            (_, _, true) => PeerEvent::IRcvMessage(msg),
            (_, _, false) => PeerEvent::RRcvMessage(msg),
        }
    }

    /// Disconnect event for one of our connections
    pub fn disconnect_event(side: Side) -> PeerEvent {
        match side {
            Side::Initiator => PeerEvent::IPeerDisc,
            Side::Receiver => PeerEvent::RPeerDisc,
        }
    }

    /// Periodic check: reconnect closed peers every Tc, time out stalled
    /// handshakes, send watchdogs on idle connections and drop connections
    /// whose watchdog went unanswered.
    pub fn timer_check(&mut self, now: Instant, timers: &PeerTimers) -> TimerDecision {
        let elapsed = |since: Option<Instant>| match since {
            Some(t) => now.saturating_duration_since(t),
            None => Duration::MAX,
        };

        if self.disabled {
            return if self.is_open() {
                self.touch(now);
                TimerDecision::Event(PeerEvent::Stop)
            } else {
                TimerDecision::Nothing
            };
        }

        match self.state {
            PeerState::Closed => {
                if self.is_dynamic && timers.drop_unknown {
                    TimerDecision::Remove
                } else if elapsed(self.last_activity) >= timers.tc {
                    self.touch(now);
                    TimerDecision::Event(PeerEvent::Start)
                } else {
                    TimerDecision::Nothing
                }
            }
            state if state.is_waiting() => {
                if elapsed(self.last_activity) >= timers.tc {
                    self.touch(now);
                    TimerDecision::Event(PeerEvent::Timeout)
                } else {
                    TimerDecision::Nothing
                }
            }
            _ => {
                if elapsed(self.last_activity) < timers.watchdog {
                    return TimerDecision::Nothing;
                }
                let Some(conn) = self.active_conn() else {
                    return TimerDecision::Nothing;
                };
                if self.waiting_dwa {
                    let side = self.side_of(conn).unwrap_or(Side::Initiator);
                    TimerDecision::Event(Self::disconnect_event(side))
                } else {
                    self.waiting_dwa = true;
                    self.touch(now);
                    TimerDecision::SendDwr { conn }
                }
            }
        }
    }
}

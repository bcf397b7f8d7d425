use cdp_core::DiameterMessage;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Absolute expiry instant in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Deadline {
    Unset,
    At(i64),
    /// Never expires (0xFFFFFFFF on the wire)
    Never,
}

impl Deadline {
    pub fn is_due(&self, now: i64) -> bool {
        matches!(self, Self::At(t) if *t <= now)
    }

    /// Seconds left, as carried in timer AVPs
    pub fn remaining(&self, now: i64) -> Option<u32> {
        match self {
            Self::Unset => None,
            Self::Never => Some(u32::MAX),
            Self::At(t) => Some((*t - now).clamp(0, i64::from(u32::MAX - 1)) as u32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    Idle,
    Pending,
    Open,
    Discon,
}

/// Stateful authorization session data
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub state: AuthState,
    pub timeout: Deadline,
    pub lifetime: Deadline,
    pub grace_period: u32,
}

impl AuthSession {
    pub fn new(now: i64, default_timeout: u32) -> Self {
        Self {
            state: AuthState::Idle,
            timeout: Deadline::At(now + i64::from(default_timeout)),
            lifetime: Deadline::Unset,
            grace_period: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CcAcctState {
    Idle,
    PendingI,
    PendingU,
    PendingT,
    Open,
    Discon,
}

/// Session-based or one-shot event charging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CcAcctKind {
    Session,
    Event,
}

/// Credit-control accounting client session data
#[derive(Debug, Clone, PartialEq)]
pub struct CcAcctSession {
    pub state: CcAcctState,
    pub kind: CcAcctKind,
    pub discon_time: Option<i64>,
    pub charging_start_time: Option<i64>,
    pub last_reservation_time: Option<i64>,
    /// Granted CC-Time in seconds
    pub reserved_units: u32,
    pub reserved_units_validity: u32,
    pub final_unit_action: Option<u32>,
}

impl CcAcctSession {
    pub fn new(kind: CcAcctKind) -> Self {
        Self {
            state: CcAcctState::Idle,
            kind,
            discon_time: None,
            charging_start_time: None,
            last_reservation_time: None,
            reserved_units: 0,
            reserved_units_validity: 0,
            final_unit_action: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionKind {
    /// Plain session with no state machine
    Generic,
    AuthClient(AuthSession),
    AuthServer(AuthSession),
    CcAcct(CcAcctSession),
}

impl SessionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::AuthClient(_) => "auth-client",
            Self::AuthServer(_) => "auth-server",
            Self::CcAcct(_) => "cc-acct",
        }
    }
}

/// Authorization state machine inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SendRequest,
    RecvAnswer,
    RecvAnsSuccess,
    RecvAnsUnsuccess,
    RecvRequest,
    SendAnswer,
    SendAnsSuccess,
    SendAnsUnsuccess,
    SendAsr,
    RecvAsr,
    RecvAsa,
    RecvAsaSuccess,
    RecvAsaUnsuccess,
    SendAsaSuccess,
    SendAsaUnsuccess,
    RecvStr,
    RecvSta,
    SendSta,
    SessionTimeout,
    LifetimeTimeout,
    GraceTimeout,
    ServiceTerminated,
}

/// Credit-control accounting state machine inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcEvent {
    SendRequest,
    RecvAnswer,
    RecvAnsSuccess,
    RecvAnsUnsuccess,
    ReservationWarning,
    SessionStale,
}

/// What the owner callback is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    Auth(AuthEvent),
    Cc(CcEvent),
    /// Sent after every processed transition that keeps the session
    Modified,
    /// The state machine is about to remove the session
    Terminated,
    /// The session is being removed from the table
    Dropped,
}

pub type SessionCallback = Arc<dyn Fn(SessionEvent, &mut Session) + Send + Sync>;

/// A Diameter session record
pub struct Session {
    pub id: String,
    pub application_id: u32,
    pub vendor_id: u32,
    pub dest_host: Option<String>,
    pub dest_realm: Option<String>,
    /// Peer chosen for the first request of this session
    pub sticky_peer: Option<String>,
    pub kind: SessionKind,
    /// Owner payload
    pub data: Option<Box<dyn Any + Send>>,
    pub(crate) callback: Option<SessionCallback>,
}

impl Session {
    pub fn new(id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: id.into(),
            application_id: 0,
            vendor_id: 0,
            dest_host: None,
            dest_realm: None,
            sticky_peer: None,
            kind,
            data: None,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Option<SessionCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn set_callback(&mut self, callback: SessionCallback) {
        self.callback = Some(callback);
    }

    /// Invoke the owner callback, if any
    pub fn notify(&mut self, event: SessionEvent) {
        if let Some(cb) = self.callback.clone() {
            cb(event, self);
        }
    }

    pub fn auth(&self) -> Option<&AuthSession> {
        match &self.kind {
            SessionKind::AuthClient(a) | SessionKind::AuthServer(a) => Some(a),
            _ => None,
        }
    }

    pub fn auth_mut(&mut self) -> Option<&mut AuthSession> {
        match &mut self.kind {
            SessionKind::AuthClient(a) | SessionKind::AuthServer(a) => Some(a),
            _ => None,
        }
    }

    pub fn cc_acct(&self) -> Option<&CcAcctSession> {
        match &self.kind {
            SessionKind::CcAcct(c) => Some(c),
            _ => None,
        }
    }

    pub fn cc_acct_mut(&mut self) -> Option<&mut CcAcctSession> {
        match &mut self.kind {
            SessionKind::CcAcct(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("application_id", &self.application_id)
            .field("vendor_id", &self.vendor_id)
            .field("dest_realm", &self.dest_realm)
            .field("sticky_peer", &self.sticky_peer)
            .field("kind", &self.kind)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Messages produced by the state machines
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send `msg`; directly to `peer` when set, otherwise through routing
    Send {
        msg: DiameterMessage,
        peer: Option<String>,
    },
}

/// Source of hop-by-hop and end-to-end identifiers for generated requests
pub trait MessageIds {
    fn next_ids(&self) -> (u32, u32);
}

/// Per-call environment of a state machine step
pub struct SessionContext<'a> {
    pub origin_host: &'a str,
    pub origin_realm: &'a str,
    pub default_auth_session_timeout: u32,
    pub max_auth_session_timeout: u32,
    /// Unix seconds
    pub now: i64,
    pub ids: &'a dyn MessageIds,
}

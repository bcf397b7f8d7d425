//! Diameter session layer: the bucketed session table, stateful
//! authorization sessions (client and server) and credit-control
//! accounting sessions.
//!
//! Everything here is synchronous. Callers pass the current time and an
//! identifier source in a [`SessionContext`] and send the returned
//! [`SessionAction`]s themselves.

pub mod acct;
pub mod auth;
pub mod dispatch;
pub mod table;
pub mod timers;
pub mod types;

pub use acct::{
    cc_acct_process, request_type, start_charging, terminate_cc_acct_session, CcRequestType,
};
pub use auth::{
    answer_unknown_asr, auth_client_process, auth_server_process, build_asr, build_str,
    terminate_auth_session,
};
pub use dispatch::Received;
pub use table::{SessionGuard, SessionIdGenerator, SessionTable};
pub use timers::{add_auth_session_timers, update_auth_session_timers};
pub use types::{
    AuthEvent, AuthSession, AuthState, CcAcctKind, CcAcctSession, CcAcctState, CcEvent, Deadline,
    MessageIds, Session, SessionAction, SessionCallback, SessionContext, SessionEvent, SessionKind,
};

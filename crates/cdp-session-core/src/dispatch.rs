//! Feeding sent and received messages into the session state machines,
//! and the periodic timer sweep.

use crate::acct::{cc_acct_process, cc_step, STALE_SESSION_SECS};
use crate::auth::{answer_unknown_asr, auth_client_process, auth_server_process, client_step, server_step};
use crate::table::{SessionTable, Slot};
use crate::timers::reservation_expiring;
use crate::types::{
    AuthEvent, AuthSession, CcAcctKind, CcAcctState, CcEvent, SessionAction, SessionContext,
    SessionKind,
};
use cdp_core::DiameterMessage;
use cdp_dict::{command, result_code};
use tracing::trace;

/// Outcome of handing a received message to the session layer
#[derive(Debug, Default)]
pub struct Received {
    pub actions: Vec<SessionAction>,
    /// The message was absorbed by the session layer and must not be
    /// delivered to the application
    pub consumed: bool,
}

impl SessionTable {
    /// Run the session state machine for a message being sent
    pub fn process_sending(
        &self,
        msg: &mut DiameterMessage,
        ctx: &SessionContext<'_>,
    ) -> Vec<SessionAction> {
        let Some(id) = msg.session_id() else {
            return Vec::new();
        };
        let Some(guard) = self.get(&id) else {
            return Vec::new();
        };

        let is_request = msg.is_request();
        let code = msg.command_code();
        match &guard.kind {
            SessionKind::AuthClient(_) => {
                let event = if is_request {
                    AuthEvent::SendRequest
                } else if code == command::ABORT_SESSION {
                    match msg.result_code() {
                        Some(rc) if result_code::is_success(rc) => AuthEvent::SendAsaSuccess,
                        _ => AuthEvent::SendAsaUnsuccess,
                    }
                } else {
                    return Vec::new();
                };
                auth_client_process(guard, event, Some(msg), ctx)
            }
            SessionKind::AuthServer(_) => {
                let event = match (is_request, code) {
                    (true, command::ABORT_SESSION) => AuthEvent::SendAsr,
                    (true, _) => return Vec::new(),
                    (false, command::SESSION_TERMINATION) => AuthEvent::SendSta,
                    (false, _) => AuthEvent::SendAnswer,
                };
                auth_server_process(guard, event, Some(msg), ctx).1
            }
            SessionKind::CcAcct(_) if is_request => {
                cc_acct_process(guard, CcEvent::SendRequest, Some(&*msg), ctx);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Run the session state machine for a received message
    pub fn process_received(&self, msg: &mut DiameterMessage, ctx: &SessionContext<'_>) -> Received {
        let mut received = Received::default();
        let Some(id) = msg.session_id() else {
            return received;
        };
        let is_request = msg.is_request();
        let code = msg.command_code();

        let Some(guard) = self.get(&id) else {
            if is_request && code == command::ABORT_SESSION {
                received.actions = answer_unknown_asr(msg, ctx);
            }
            return received;
        };

        match &guard.kind {
            SessionKind::AuthClient(_) => {
                let event = match (is_request, code) {
                    (true, command::ABORT_SESSION) => AuthEvent::RecvAsr,
                    (true, _) => return received,
                    (false, command::SESSION_TERMINATION) => {
                        received.consumed = true;
                        AuthEvent::RecvSta
                    }
                    (false, _) => AuthEvent::RecvAnswer,
                };
                received.actions = auth_client_process(guard, event, Some(msg), ctx);
            }
            SessionKind::AuthServer(_) => {
                let event = match (is_request, code) {
                    (true, command::SESSION_TERMINATION) => AuthEvent::RecvStr,
                    (true, _) => AuthEvent::RecvRequest,
                    (false, command::ABORT_SESSION) => AuthEvent::RecvAsa,
                    (false, _) => return received,
                };
                // a request that reopens the session hands the guard back; it
                // is released here
                received.actions = auth_server_process(guard, event, Some(msg), ctx).1;
            }
            SessionKind::CcAcct(_) if !is_request => {
                cc_acct_process(guard, CcEvent::RecvAnswer, Some(&*msg), ctx);
            }
            _ => {}
        }
        received
    }

    /// Fire every session timer that has elapsed
    pub fn sweep(&self, ctx: &SessionContext<'_>) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        self.visit(|slot| sweep_one(slot, ctx, &mut actions));
        actions
    }
}

fn due_auth_event(auth: &AuthSession, now: i64) -> Option<AuthEvent> {
    use crate::types::Deadline;

    if auth.timeout.is_due(now) {
        return Some(AuthEvent::SessionTimeout);
    }
    if let Deadline::At(lifetime) = auth.lifetime {
        if lifetime + i64::from(auth.grace_period) <= now {
            return Some(AuthEvent::GraceTimeout);
        }
    }
    auth.lifetime.is_due(now).then_some(AuthEvent::LifetimeTimeout)
}

fn sweep_one(slot: &mut Slot<'_>, ctx: &SessionContext<'_>, actions: &mut Vec<SessionAction>) {
    let now = ctx.now;
    match &slot.session().kind {
        SessionKind::CcAcct(cc) if cc.kind == CcAcctKind::Session => {
            let event = match cc.state {
                CcAcctState::Discon
                    if cc.discon_time.is_some_and(|t| now > t + STALE_SESSION_SECS) =>
                {
                    CcEvent::SessionStale
                }
                CcAcctState::Open if reservation_expiring(cc, now) => CcEvent::ReservationWarning,
                _ => return,
            };
            trace!(session_id = %slot.session().id, event = ?event, "session timer");
            cc_step(slot, event, None, now);
        }
        SessionKind::AuthClient(auth) => {
            let Some(event) = due_auth_event(auth, now) else { return };
            trace!(session_id = %slot.session().id, event = ?event, "session timer");
            client_step(slot, event, None, ctx, actions);
        }
        SessionKind::AuthServer(auth) => {
            let Some(event) = due_auth_event(auth, now) else { return };
            trace!(session_id = %slot.session().id, event = ?event, "session timer");
            server_step(slot, event, None, ctx, actions);
        }
        _ => {}
    }
}

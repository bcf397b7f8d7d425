//! Credit-control accounting client session (RFC 4006 style charging).

use crate::table::{SessionGuard, SessionTable, Slot};
use crate::timers::update_reservation;
use crate::types::{
    CcAcctKind, CcAcctSession, CcAcctState, CcEvent, Session, SessionCallback, SessionContext,
    SessionEvent, SessionKind,
};
use cdp_core::{CdpError, DiameterMessage, Result};
use cdp_dict::{accounting_record_type, avp, cc_request_type, result_code};
use std::any::Any;
use tracing::warn;

/// Seconds a disconnected session is kept before it is reported stale
pub const STALE_SESSION_SECS: i64 = 60;

/// Kind of a credit-control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcRequestType {
    Initial,
    Update,
    Termination,
    Event,
}

/// Request type from CC-Request-Type, else from Accounting-Record-Type
pub fn request_type(msg: &DiameterMessage) -> Option<CcRequestType> {
    if let Some(t) = msg.get_u32(avp::CC_REQUEST_TYPE) {
        return match t {
            cc_request_type::INITIAL => Some(CcRequestType::Initial),
            cc_request_type::UPDATE => Some(CcRequestType::Update),
            cc_request_type::TERMINATION => Some(CcRequestType::Termination),
            cc_request_type::EVENT => Some(CcRequestType::Event),
            _ => None,
        };
    }
    match msg.get_u32(avp::ACCOUNTING_RECORD_TYPE)? {
        accounting_record_type::START => Some(CcRequestType::Initial),
        accounting_record_type::INTERIM => Some(CcRequestType::Update),
        accounting_record_type::STOP => Some(CcRequestType::Termination),
        accounting_record_type::EVENT => Some(CcRequestType::Event),
        _ => None,
    }
}

fn set_state(slot: &mut Slot<'_>, state: CcAcctState) {
    if let Some(cc) = slot.session().cc_acct_mut() {
        cc.state = state;
    }
}

fn disconnect(slot: &mut Slot<'_>, now: i64) {
    if let Some(cc) = slot.session().cc_acct_mut() {
        cc.state = CcAcctState::Discon;
        cc.discon_time = Some(now);
    }
}

pub(crate) fn cc_step(
    slot: &mut Slot<'_>,
    event: CcEvent,
    msg: Option<&DiameterMessage>,
    now: i64,
) {
    use CcAcctState as S;
    use CcEvent as E;

    slot.session().notify(SessionEvent::Cc(event));
    let Some(state) = slot.session().cc_acct().map(|c| c.state) else {
        warn!(session_id = %slot.session().id, "not a credit-control session");
        return;
    };

    let event = match (event, msg) {
        (E::RecvAnswer, Some(m)) => {
            if m.result_code().map(result_code::is_success).unwrap_or(false) {
                E::RecvAnsSuccess
            } else {
                E::RecvAnsUnsuccess
            }
        }
        _ => event,
    };
    let kind = match event {
        E::SendRequest => msg.and_then(request_type),
        _ => None,
    };

    match (state, event, kind) {
        (S::Idle, E::SendRequest, Some(CcRequestType::Initial)) => set_state(slot, S::PendingI),
        (S::Idle, E::SendRequest, Some(CcRequestType::Event)) => set_state(slot, S::PendingT),

        (S::PendingI | S::PendingU, E::RecvAnsSuccess, _) => {
            set_state(slot, S::Open);
            if let (Some(m), Some(cc)) = (msg, slot.session().cc_acct_mut()) {
                update_reservation(cc, m, now);
            }
        }
        (S::PendingI | S::PendingU, E::RecvAnsUnsuccess, _) => disconnect(slot, now),

        (S::Open, E::SendRequest, Some(CcRequestType::Update)) => set_state(slot, S::PendingU),
        (S::Open, E::SendRequest, Some(CcRequestType::Termination)) => {
            set_state(slot, S::PendingT)
        }
        (S::Open, E::ReservationWarning, _) => {}

        (S::PendingT, E::RecvAnsSuccess | E::RecvAnsUnsuccess, _) => disconnect(slot, now),

        (S::Discon, E::SessionStale, _) => slot.cleanup(),

        (state, event, kind) => {
            warn!(
                session_id = %slot.session().id,
                state = ?state,
                event = ?event,
                request_type = ?kind,
                "invalid event for credit-control session state"
            );
        }
    }

    if !slot.is_removed() {
        slot.session().notify(SessionEvent::Modified);
    }
}

/// Run the credit-control state machine; the session lock is released on return
pub fn cc_acct_process(
    mut guard: SessionGuard<'_>,
    event: CcEvent,
    msg: Option<&DiameterMessage>,
    ctx: &SessionContext<'_>,
) {
    let mut slot = guard.slot();
    cc_step(&mut slot, event, msg, ctx.now);
}

/// Record when charging started for the session
pub fn start_charging(session: &mut Session, now: i64) -> Result<()> {
    let id = session.id.clone();
    let cc = session.cc_acct_mut().ok_or_else(|| {
        CdpError::ProtocolError(format!("{id} is not a credit-control session"))
    })?;
    cc.charging_start_time = Some(now);
    Ok(())
}

/// End a credit-control session immediately
pub fn terminate_cc_acct_session(mut guard: SessionGuard<'_>) {
    if matches!(guard.kind, SessionKind::CcAcct(_)) {
        let mut slot = guard.slot();
        slot.cleanup();
    }
}

impl SessionTable {
    /// New credit-control session in Idle, returned locked
    pub fn create_cc_acct_session(
        &self,
        kind: CcAcctKind,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
    ) -> SessionGuard<'_> {
        let mut session = Session::new(
            self.generate_id(),
            SessionKind::CcAcct(CcAcctSession::new(kind)),
        )
        .with_callback(callback);
        session.data = data;
        let mut guard = self.insert(session);
        guard.notify(SessionEvent::Created);
        guard
    }
}

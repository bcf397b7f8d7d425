//! Stateful authorization session state machines (RFC 6733 section 8.1).

use crate::table::{SessionGuard, SessionTable, Slot};
use crate::timers::{add_auth_session_timers, update_auth_session_timers};
use crate::types::{
    AuthEvent, AuthSession, AuthState, Session, SessionAction, SessionCallback, SessionContext,
    SessionEvent, SessionKind,
};
use cdp_core::diameter::AVP_FLAG_MANDATORY;
use cdp_core::{CdpError, DiameterAvp, DiameterMessage, Result};
use cdp_dict::{abort_cause, auth_session_state, avp, command, result_code, termination_cause, vendor};
use std::any::Any;
use tracing::{debug, warn};

/// Whether the server's answer establishes a maintained session
fn answer_succeeded(msg: &DiameterMessage) -> bool {
    let rc_ok = msg
        .result_code()
        .map(result_code::is_success)
        .unwrap_or(false);
    let maintained = msg
        .get_u32(avp::AUTH_SESSION_STATE)
        .unwrap_or(auth_session_state::STATE_MAINTAINED)
        == auth_session_state::STATE_MAINTAINED;
    rc_ok && maintained
}

fn auth_state(slot: &mut Slot<'_>) -> Option<AuthState> {
    slot.session().auth().map(|a| a.state)
}

fn set_state(slot: &mut Slot<'_>, state: AuthState) {
    if let Some(auth) = slot.session().auth_mut() {
        auth.state = state;
    }
}

fn update_timers(slot: &mut Slot<'_>, msg: Option<&DiameterMessage>, ctx: &SessionContext<'_>) {
    let Some(msg) = msg else { return };
    if let Some(auth) = slot.session().auth_mut() {
        update_auth_session_timers(
            auth,
            msg,
            ctx.now,
            ctx.default_auth_session_timeout,
            ctx.max_auth_session_timeout,
        );
    }
}

fn add_timers(slot: &mut Slot<'_>, msg: Option<&mut DiameterMessage>, ctx: &SessionContext<'_>) {
    let Some(msg) = msg else { return };
    if let Some(auth) = slot.session().auth() {
        add_auth_session_timers(auth, msg, ctx.now);
    }
}

fn add_identity(msg: &mut DiameterMessage, ctx: &SessionContext<'_>) {
    msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, AVP_FLAG_MANDATORY, 0, ctx.origin_host));
    msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_REALM, AVP_FLAG_MANDATORY, 0, ctx.origin_realm));
}

/// Session-Termination-Request for `session`. The destination realm is
/// taken from the Origin-Realm of `trigger` when there is one.
pub fn build_str(
    session: &Session,
    trigger: Option<&DiameterMessage>,
    ctx: &SessionContext<'_>,
) -> DiameterMessage {
    let (hbh, e2e) = ctx.ids.next_ids();
    let mut msg =
        DiameterMessage::new_request(command::SESSION_TERMINATION, session.application_id, hbh, e2e);
    msg.add_avp(DiameterAvp::from_str(avp::SESSION_ID, AVP_FLAG_MANDATORY, 0, &session.id));
    add_identity(&mut msg, ctx);

    let realm = trigger
        .and_then(DiameterMessage::origin_realm)
        .or_else(|| session.dest_realm.clone());
    if let Some(realm) = realm {
        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_REALM, AVP_FLAG_MANDATORY, 0, &realm));
    }
    if session.vendor_id != vendor::IETF {
        msg.add_avp(DiameterAvp::grouped(
            avp::VENDOR_SPECIFIC_APPLICATION_ID,
            AVP_FLAG_MANDATORY,
            0,
            &[
                DiameterAvp::from_u32(avp::VENDOR_ID, AVP_FLAG_MANDATORY, 0, session.vendor_id),
                DiameterAvp::from_u32(
                    avp::AUTH_APPLICATION_ID,
                    AVP_FLAG_MANDATORY,
                    0,
                    session.application_id,
                ),
            ],
        ));
    }
    msg.add_avp(DiameterAvp::from_u32(
        avp::AUTH_APPLICATION_ID,
        AVP_FLAG_MANDATORY,
        0,
        session.application_id,
    ));
    msg.add_avp(DiameterAvp::from_u32(
        avp::TERMINATION_CAUSE,
        AVP_FLAG_MANDATORY,
        0,
        termination_cause::ADMINISTRATIVE,
    ));
    msg
}

/// Abort-Session-Request towards the client of a server session
pub fn build_asr(session: &Session, ctx: &SessionContext<'_>) -> DiameterMessage {
    let (hbh, e2e) = ctx.ids.next_ids();
    let mut msg =
        DiameterMessage::new_request(command::ABORT_SESSION, session.application_id, hbh, e2e);
    msg.add_avp(DiameterAvp::from_str(avp::SESSION_ID, AVP_FLAG_MANDATORY, 0, &session.id));
    add_identity(&mut msg, ctx);
    if let Some(host) = &session.dest_host {
        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_HOST, AVP_FLAG_MANDATORY, 0, host));
    }
    if let Some(realm) = &session.dest_realm {
        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_REALM, AVP_FLAG_MANDATORY, 0, realm));
    }
    msg.add_avp(DiameterAvp::from_u32(
        avp::AUTH_APPLICATION_ID,
        AVP_FLAG_MANDATORY,
        0,
        session.application_id,
    ));
    msg.add_avp(DiameterAvp::from_u32(
        avp::ABORT_CAUSE,
        AVP_FLAG_MANDATORY,
        vendor::TGPP,
        abort_cause::BEARER_RELEASED,
    ));
    msg
}

/// Abort-Session-Answer, always DIAMETER_SUCCESS, sent back towards the
/// peer the request came from.
pub fn build_asa(asr: &DiameterMessage, ctx: &SessionContext<'_>) -> SessionAction {
    let mut asa = DiameterMessage::answer_to(asr);
    asa.add_avp(DiameterAvp::from_u32(
        avp::RESULT_CODE,
        AVP_FLAG_MANDATORY,
        0,
        result_code::SUCCESS,
    ));
    add_identity(&mut asa, ctx);
    SessionAction::Send {
        msg: asa,
        peer: asr.origin_peer.clone().or_else(|| asr.origin_host()),
    }
}

fn send_str(
    slot: &mut Slot<'_>,
    trigger: Option<&DiameterMessage>,
    ctx: &SessionContext<'_>,
    actions: &mut Vec<SessionAction>,
) {
    let msg = build_str(slot.session(), trigger, ctx);
    actions.push(SessionAction::Send { msg, peer: None });
}

/// An ASR for a session we do not know is still acknowledged
pub fn answer_unknown_asr(asr: &DiameterMessage, ctx: &SessionContext<'_>) -> Vec<SessionAction> {
    debug!(session_id = ?asr.session_id(), "ASR for unknown session");
    vec![build_asa(asr, ctx)]
}

fn invalid(slot: &mut Slot<'_>, state: AuthState, event: AuthEvent) {
    warn!(
        session_id = %slot.session().id,
        state = ?state,
        event = ?event,
        "invalid event for auth session state"
    );
}

pub(crate) fn client_step(
    slot: &mut Slot<'_>,
    event: AuthEvent,
    mut msg: Option<&mut DiameterMessage>,
    ctx: &SessionContext<'_>,
    actions: &mut Vec<SessionAction>,
) {
    use AuthEvent as E;
    use AuthState as S;

    slot.session().notify(SessionEvent::Auth(event));
    let Some(state) = auth_state(slot) else {
        warn!(session_id = %slot.session().id, "not an auth session");
        return;
    };

    let event = match (state, event, msg.as_deref()) {
        (S::Pending | S::Open, E::RecvAnswer, Some(m)) if m.is_answer() => {
            if answer_succeeded(m) {
                E::RecvAnsSuccess
            } else {
                E::RecvAnsUnsuccess
            }
        }
        _ => event,
    };

    match (state, event) {
        (S::Idle, E::SendRequest) => {
            if let Some(m) = msg.as_deref() {
                let session = slot.session();
                session.application_id = m.application_id();
                session.vendor_id = m.application_vendor().1;
                if let Some(realm) = m.destination_realm() {
                    session.dest_realm = Some(realm);
                }
            }
            set_state(slot, S::Pending);
            update_timers(slot, msg.as_deref(), ctx);
            add_timers(slot, msg.as_deref_mut(), ctx);
        }

        (S::Pending, E::RecvAnsSuccess) => {
            set_state(slot, S::Open);
            update_timers(slot, msg.as_deref(), ctx);
        }
        (S::Pending, E::RecvAnsUnsuccess)
        | (S::Pending, E::SessionTimeout)
        | (S::Pending, E::ServiceTerminated)
        | (S::Pending, E::GraceTimeout) => slot.cleanup(),
        // never used, expired
        (S::Idle, E::SessionTimeout) | (S::Idle, E::GraceTimeout) => slot.cleanup(),
        // grace or session timeout follows
        (S::Idle | S::Pending, E::LifetimeTimeout) => {}

        (S::Open, E::SendRequest) => {
            let is_str = msg
                .as_deref()
                .map(|m| m.command_code() == command::SESSION_TERMINATION)
                .unwrap_or(false);
            if is_str {
                set_state(slot, S::Discon);
            } else {
                add_timers(slot, msg.as_deref_mut(), ctx);
            }
        }
        (S::Open, E::RecvAnsSuccess) => update_timers(slot, msg.as_deref(), ctx),
        (S::Open, E::RecvAnsUnsuccess) => set_state(slot, S::Discon),
        (S::Open, E::SessionTimeout)
        | (S::Open, E::LifetimeTimeout)
        | (S::Open, E::ServiceTerminated)
        | (S::Open, E::GraceTimeout)
        | (S::Open, E::SendAsaSuccess) => {
            set_state(slot, S::Discon);
            send_str(slot, msg.as_deref(), ctx, actions);
        }
        (S::Open, E::SendAsaUnsuccess) => update_timers(slot, msg.as_deref(), ctx),
        (S::Open, E::RecvAsr) => {
            set_state(slot, S::Discon);
            if let Some(asr) = msg.as_deref() {
                actions.push(build_asa(asr, ctx));
            }
            send_str(slot, msg.as_deref(), ctx, actions);
        }

        (S::Discon, E::RecvAsr) => {
            if let Some(asr) = msg.as_deref() {
                actions.push(build_asa(asr, ctx));
            }
        }
        (S::Discon, E::SessionTimeout) | (S::Discon, E::GraceTimeout) | (S::Discon, E::RecvSta) => {
            set_state(slot, S::Idle);
            slot.cleanup();
        }
        // lifetime passed, grace still running
        (S::Discon, E::LifetimeTimeout) => {}

        (state, event) => invalid(slot, state, event),
    }

    if !slot.is_removed() {
        slot.session().notify(SessionEvent::Modified);
    }
}

/// Result of a server step
pub(crate) enum ServerOutcome {
    Release,
    /// The request opened the session; the caller keeps it locked
    HandBack,
}

pub(crate) fn server_step(
    slot: &mut Slot<'_>,
    event: AuthEvent,
    mut msg: Option<&mut DiameterMessage>,
    ctx: &SessionContext<'_>,
    actions: &mut Vec<SessionAction>,
) -> ServerOutcome {
    use AuthEvent as E;
    use AuthState as S;

    slot.session().notify(SessionEvent::Auth(event));
    let Some(state) = auth_state(slot) else {
        warn!(session_id = %slot.session().id, "not an auth session");
        return ServerOutcome::Release;
    };

    let event = match (state, event, msg.as_deref()) {
        (S::Open, E::SendAnswer, Some(m)) if m.is_answer() => {
            if m.result_code().map(result_code::is_success).unwrap_or(false) {
                E::SendAnsSuccess
            } else {
                E::SendAnsUnsuccess
            }
        }
        (S::Discon, E::RecvAsa, Some(m)) => match m.result_code() {
            Some(rc) if !result_code::is_success(rc) => E::RecvAsaUnsuccess,
            _ => E::RecvAsaSuccess,
        },
        _ => event,
    };

    match (state, event) {
        (S::Idle, E::RecvStr) | (S::Open, E::RecvStr) | (S::Discon, E::RecvStr) => {}
        (S::Idle, E::RecvRequest) => {
            set_state(slot, S::Open);
            slot.session().notify(SessionEvent::Modified);
            return ServerOutcome::HandBack;
        }
        (S::Idle, E::SendSta)
        | (S::Idle, E::SessionTimeout)
        | (S::Idle, E::GraceTimeout)
        | (S::Open, E::SendAnsUnsuccess)
        | (S::Open, E::SessionTimeout)
        | (S::Open, E::GraceTimeout)
        | (S::Open, E::SendSta)
        | (S::Discon, E::SendSta) => {
            set_state(slot, S::Idle);
            slot.cleanup();
        }

        (S::Open, E::RecvRequest) => {}
        (S::Open, E::SendAnsSuccess) => {
            update_timers(slot, msg.as_deref(), ctx);
            add_timers(slot, msg.as_deref_mut(), ctx);
        }
        (S::Open, E::SendAsr) => set_state(slot, S::Discon),

        (S::Discon, E::RecvAsaSuccess) => set_state(slot, S::Idle),
        (S::Discon, E::RecvAsaUnsuccess) => {
            let asr = build_asr(slot.session(), ctx);
            actions.push(SessionAction::Send {
                msg: asr,
                peer: None,
            });
        }
        (S::Idle | S::Discon, E::LifetimeTimeout) | (S::Open, E::LifetimeTimeout) => {}

        (state, event) => invalid(slot, state, event),
    }

    if !slot.is_removed() {
        slot.session().notify(SessionEvent::Modified);
    }
    ServerOutcome::Release
}

/// Run the client state machine; the session lock is released on return
pub fn auth_client_process(
    mut guard: SessionGuard<'_>,
    event: AuthEvent,
    msg: Option<&mut DiameterMessage>,
    ctx: &SessionContext<'_>,
) -> Vec<SessionAction> {
    let mut actions = Vec::new();
    let mut slot = guard.slot();
    client_step(&mut slot, event, msg, ctx, &mut actions);
    actions
}

/// Run the server state machine. The session comes back still locked only
/// when a request moved it from Idle to Open.
pub fn auth_server_process<'a>(
    mut guard: SessionGuard<'a>,
    event: AuthEvent,
    msg: Option<&mut DiameterMessage>,
    ctx: &SessionContext<'_>,
) -> (Option<SessionGuard<'a>>, Vec<SessionAction>) {
    let mut actions = Vec::new();
    let outcome = {
        let mut slot = guard.slot();
        server_step(&mut slot, event, msg, ctx, &mut actions)
    };
    match outcome {
        ServerOutcome::HandBack => (Some(guard), actions),
        ServerOutcome::Release => (None, actions),
    }
}

impl SessionTable {
    /// New client session in Idle, returned locked
    pub fn create_client_auth_session(
        &self,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
        ctx: &SessionContext<'_>,
    ) -> SessionGuard<'_> {
        let mut session = Session::new(
            self.generate_id(),
            SessionKind::AuthClient(AuthSession::new(ctx.now, ctx.default_auth_session_timeout)),
        )
        .with_callback(callback);
        session.data = data;
        let mut guard = self.insert(session);
        guard.notify(SessionEvent::Created);
        guard
    }

    /// Server session for an incoming request, keyed by its Session-Id and
    /// already moved to Open. The session is returned locked.
    pub fn create_server_auth_session(
        &self,
        request: &DiameterMessage,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionGuard<'_>> {
        let id = request
            .session_id()
            .filter(|id| !id.is_empty())
            .ok_or(CdpError::MissingAvp(avp::SESSION_ID))?;

        let mut auth = AuthSession::new(ctx.now, ctx.default_auth_session_timeout);
        update_auth_session_timers(
            &mut auth,
            request,
            ctx.now,
            ctx.default_auth_session_timeout,
            ctx.max_auth_session_timeout,
        );
        let mut session = Session::new(id, SessionKind::AuthServer(auth)).with_callback(callback);
        session.data = data;
        session.application_id = request.application_id();
        session.vendor_id = request.application_vendor().1;
        session.dest_host = request.origin_host();
        session.dest_realm = request.origin_realm();

        let mut guard = self.insert(session);
        guard.notify(SessionEvent::Created);
        let (guard, _) = auth_server_process(guard, AuthEvent::RecvRequest, None, ctx);
        guard.ok_or_else(|| CdpError::InternalError("server session not opened".into()))
    }
}

/// Ask the client state machine to end the session (STR)
pub fn terminate_auth_session(guard: SessionGuard<'_>, ctx: &SessionContext<'_>) -> Vec<SessionAction> {
    if matches!(guard.kind, SessionKind::AuthClient(_)) {
        auth_client_process(guard, AuthEvent::ServiceTerminated, None, ctx)
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Deadline, MessageIds};
    use cdp_dict::application;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counter(AtomicU32);

    impl MessageIds for Counter {
        fn next_ids(&self) -> (u32, u32) {
            let n = self.0.fetch_add(1, Ordering::Relaxed);
            (n, n)
        }
    }

    const NOW: i64 = 1_700_000_000;

    fn ctx(ids: &Counter) -> SessionContext<'_> {
        SessionContext {
            origin_host: "pcscf.ims.test",
            origin_realm: "ims.test",
            default_auth_session_timeout: 60,
            max_auth_session_timeout: 3600,
            now: NOW,
            ids,
        }
    }

    fn recorder() -> (SessionCallback, Arc<Mutex<Vec<SessionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        let cb: SessionCallback =
            Arc::new(move |ev: SessionEvent, _s: &mut Session| log.lock().push(ev));
        (cb, events)
    }

    fn aar(session_id: &str) -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(command::AA, application::RX, 1, 1);
        msg.add_avp(DiameterAvp::from_str(avp::SESSION_ID, 0, 0, session_id));
        msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "pcscf.ims.test"));
        msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_REALM, 0, 0, "ims.test"));
        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_REALM, 0, 0, "pcrf.test"));
        msg.add_avp(DiameterAvp::grouped(
            avp::VENDOR_SPECIFIC_APPLICATION_ID,
            0,
            0,
            &[
                DiameterAvp::from_u32(avp::VENDOR_ID, 0, 0, vendor::TGPP),
                DiameterAvp::from_u32(avp::AUTH_APPLICATION_ID, 0, 0, application::RX),
            ],
        ));
        msg
    }

    fn answer_with(req: &DiameterMessage, rc: u32) -> DiameterMessage {
        let mut ans = DiameterMessage::answer_to(req);
        ans.add_avp(DiameterAvp::from_u32(avp::RESULT_CODE, 0, 0, rc));
        ans.add_avp(DiameterAvp::from_str(avp::ORIGIN_REALM, 0, 0, "pcrf.test"));
        ans
    }

    fn state_of(table: &SessionTable, id: &str) -> Option<AuthState> {
        table.get(id).and_then(|g| g.auth().map(|a| a.state))
    }

    #[test]
    fn test_client_open_and_terminate() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");
        let (cb, events) = recorder();

        let guard = table.create_client_auth_session(Some(cb), None, &ctx);
        let id = guard.id.clone();
        let mut req = aar(&id);
        let actions = auth_client_process(guard, AuthEvent::SendRequest, Some(&mut req), &ctx);
        assert!(actions.is_empty());
        assert_eq!(state_of(&table, &id), Some(AuthState::Pending));
        // timers were added to the outgoing request
        assert_eq!(req.get_u32(avp::SESSION_TIMEOUT), Some(60));

        let mut aaa = answer_with(&req, 2001);
        let guard = table.get(&id).unwrap();
        auth_client_process(guard, AuthEvent::RecvAnswer, Some(&mut aaa), &ctx);
        assert_eq!(state_of(&table, &id), Some(AuthState::Open));

        let guard = table.get(&id).unwrap();
        let actions = terminate_auth_session(guard, &ctx);
        assert_eq!(state_of(&table, &id), Some(AuthState::Discon));
        let SessionAction::Send { msg: str_msg, peer } = &actions[0];
        assert_eq!(str_msg.command_code(), command::SESSION_TERMINATION);
        assert!(str_msg.is_request());
        assert_eq!(peer, &None);
        assert_eq!(str_msg.session_id().as_deref(), Some(id.as_str()));
        assert_eq!(str_msg.destination_realm().as_deref(), Some("pcrf.test"));
        assert_eq!(str_msg.get_u32(avp::TERMINATION_CAUSE), Some(4));
        assert!(str_msg.find_avp(avp::VENDOR_SPECIFIC_APPLICATION_ID).is_some());

        let mut sta = answer_with(str_msg, 2001);
        let guard = table.get(&id).unwrap();
        auth_client_process(guard, AuthEvent::RecvSta, Some(&mut sta), &ctx);
        assert!(table.get(&id).is_none());

        let events = events.lock();
        assert_eq!(events[0], SessionEvent::Created);
        assert!(events.contains(&SessionEvent::Auth(AuthEvent::ServiceTerminated)));
        assert_eq!(
            &events[events.len() - 2..],
            &[SessionEvent::Terminated, SessionEvent::Dropped]
        );
    }

    #[test]
    fn test_client_failed_answer_removes_session() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");

        let guard = table.create_client_auth_session(None, None, &ctx);
        let id = guard.id.clone();
        let mut req = aar(&id);
        auth_client_process(guard, AuthEvent::SendRequest, Some(&mut req), &ctx);

        let mut aaa = answer_with(&req, 5003);
        auth_client_process(table.get(&id).unwrap(), AuthEvent::RecvAnswer, Some(&mut aaa), &ctx);
        assert!(table.is_empty());
    }

    #[test]
    fn test_client_no_state_maintained_is_unsuccessful() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");

        let guard = table.create_client_auth_session(None, None, &ctx);
        let id = guard.id.clone();
        let mut req = aar(&id);
        auth_client_process(guard, AuthEvent::SendRequest, Some(&mut req), &ctx);

        let mut aaa = answer_with(&req, 2001);
        aaa.add_avp(DiameterAvp::from_u32(
            avp::AUTH_SESSION_STATE,
            0,
            0,
            auth_session_state::NO_STATE_MAINTAINED,
        ));
        auth_client_process(table.get(&id).unwrap(), AuthEvent::RecvAnswer, Some(&mut aaa), &ctx);
        assert!(table.get(&id).is_none());
    }

    #[test]
    fn test_client_asr_sends_asa_and_str() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");

        let guard = table.create_client_auth_session(None, None, &ctx);
        let id = guard.id.clone();
        let mut req = aar(&id);
        auth_client_process(guard, AuthEvent::SendRequest, Some(&mut req), &ctx);
        let mut aaa = answer_with(&req, 2001);
        auth_client_process(table.get(&id).unwrap(), AuthEvent::RecvAnswer, Some(&mut aaa), &ctx);

        let mut asr = DiameterMessage::new_request(command::ABORT_SESSION, application::RX, 9, 9);
        asr.add_avp(DiameterAvp::from_str(avp::SESSION_ID, 0, 0, &id));
        asr.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "pcrf.test"));
        asr.origin_peer = Some("dra.test".into());

        let actions =
            auth_client_process(table.get(&id).unwrap(), AuthEvent::RecvAsr, Some(&mut asr), &ctx);
        assert_eq!(actions.len(), 2);
        let SessionAction::Send { msg: asa, peer } = &actions[0];
        assert!(asa.is_answer());
        assert_eq!(asa.command_code(), command::ABORT_SESSION);
        assert_eq!(asa.result_code(), Some(2001));
        assert_eq!(peer.as_deref(), Some("dra.test"));
        let SessionAction::Send { msg: str_msg, .. } = &actions[1];
        assert_eq!(str_msg.command_code(), command::SESSION_TERMINATION);
        assert_eq!(state_of(&table, &id), Some(AuthState::Discon));

        // a repeated ASR in Discon is only acknowledged
        let actions =
            auth_client_process(table.get(&id).unwrap(), AuthEvent::RecvAsr, Some(&mut asr), &ctx);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_unknown_asr_answered() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let mut asr = DiameterMessage::new_request(command::ABORT_SESSION, application::RX, 9, 9);
        asr.add_avp(DiameterAvp::from_str(avp::SESSION_ID, 0, 0, "gone;1;1"));
        asr.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "pcrf.test"));

        let actions = answer_unknown_asr(&asr, &ctx);
        let SessionAction::Send { msg, peer } = &actions[0];
        assert_eq!(msg.result_code(), Some(2001));
        assert_eq!(peer.as_deref(), Some("pcrf.test"));
    }

    #[test]
    fn test_invalid_event_keeps_state_and_releases_lock() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(1, "pcscf.ims.test");

        let guard = table.create_client_auth_session(None, None, &ctx);
        let id = guard.id.clone();
        auth_client_process(guard, AuthEvent::RecvSta, None, &ctx);

        assert_eq!(state_of(&table, &id), Some(AuthState::Idle));
        // the lock was released: a second lookup does not deadlock
        assert!(table.get(&id).is_some());
    }

    #[test]
    fn test_server_session_lifecycle() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcrf.test");
        let (cb, events) = recorder();

        let mut req = aar("pcscf.ims.test;5;5");
        req.add_avp(DiameterAvp::from_u32(avp::AUTHORIZATION_LIFETIME, 0, 0, 120));
        let guard = table
            .create_server_auth_session(&req, Some(cb), None, &ctx)
            .unwrap();
        // still locked and open
        assert_eq!(guard.auth().map(|a| a.state), Some(AuthState::Open));
        assert_eq!(guard.dest_host.as_deref(), Some("pcscf.ims.test"));
        assert_eq!(guard.auth().unwrap().lifetime, Deadline::At(NOW + 120));
        drop(guard);

        let mut aaa = answer_with(&req, 2001);
        let (back, _) = auth_server_process(
            table.get("pcscf.ims.test;5;5").unwrap(),
            AuthEvent::SendAnswer,
            Some(&mut aaa),
            &ctx,
        );
        assert!(back.is_none());
        assert_eq!(aaa.get_u32(avp::AUTHORIZATION_LIFETIME), Some(120));

        let (_, actions) = auth_server_process(
            table.get("pcscf.ims.test;5;5").unwrap(),
            AuthEvent::SendAsr,
            None,
            &ctx,
        );
        assert!(actions.is_empty());

        // failed ASA: the ASR is sent again
        let asr = build_asr(&table.get("pcscf.ims.test;5;5").unwrap(), &ctx);
        assert_eq!(asr.destination_host().as_deref(), Some("pcscf.ims.test"));
        assert!(asr.find_vendor_avp(avp::ABORT_CAUSE, vendor::TGPP).is_some());
        let mut asa = answer_with(&asr, 5012);
        let (_, actions) = auth_server_process(
            table.get("pcscf.ims.test;5;5").unwrap(),
            AuthEvent::RecvAsa,
            Some(&mut asa),
            &ctx,
        );
        assert_eq!(actions.len(), 1);

        let mut sta = answer_with(&req, 2001);
        auth_server_process(
            table.get("pcscf.ims.test;5;5").unwrap(),
            AuthEvent::SendSta,
            Some(&mut sta),
            &ctx,
        );
        assert!(table.is_empty());
        assert_eq!(events.lock()[0], SessionEvent::Created);
        assert_eq!(events.lock().last(), Some(&SessionEvent::Dropped));
    }

    #[test]
    fn test_server_unsuccessful_answer_cleans_up() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcrf.test");

        let req = aar("pcscf.ims.test;6;6");
        drop(table.create_server_auth_session(&req, None, None, &ctx).unwrap());

        let mut aaa = answer_with(&req, 5030);
        auth_server_process(
            table.get("pcscf.ims.test;6;6").unwrap(),
            AuthEvent::SendAnswer,
            Some(&mut aaa),
            &ctx,
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_server_session_requires_session_id() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcrf.test");
        let req = DiameterMessage::new_request(command::AA, application::RX, 1, 1);

        assert!(matches!(
            table.create_server_auth_session(&req, None, None, &ctx),
            Err(CdpError::MissingAvp(263))
        ));
    }

    #[test]
    fn test_str_base_avps_are_mandatory() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let mut session = Session::new(
            "pcscf.ims.test;1;1".to_string(),
            SessionKind::AuthClient(AuthSession::new(NOW, 60)),
        );
        session.application_id = application::RX;
        session.vendor_id = vendor::TGPP;
        session.dest_realm = Some("pcrf.test".into());

        let str_msg = build_str(&session, None, &ctx);
        for code in [
            avp::SESSION_ID,
            avp::ORIGIN_HOST,
            avp::ORIGIN_REALM,
            avp::DESTINATION_REALM,
            avp::VENDOR_SPECIFIC_APPLICATION_ID,
            avp::AUTH_APPLICATION_ID,
            avp::TERMINATION_CAUSE,
        ] {
            assert!(str_msg.find_avp(code).unwrap().is_mandatory(), "AVP {code}");
        }
        let vsai = str_msg.find_avp(avp::VENDOR_SPECIFIC_APPLICATION_ID).unwrap();
        assert!(vsai.ungroup().unwrap().iter().all(|c| c.is_mandatory()));
    }

    #[test]
    fn test_lifetime_expiry_while_pending_waits_for_grace() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");
        let (cb, events) = recorder();

        let guard = table.create_client_auth_session(Some(cb), None, &ctx);
        let id = guard.id.clone();
        let mut req = aar(&id);
        req.add_avp(DiameterAvp::from_u32(avp::AUTHORIZATION_LIFETIME, 0, 0, 10));
        req.add_avp(DiameterAvp::from_u32(avp::AUTH_GRACE_PERIOD, 0, 0, 30));
        auth_client_process(guard, AuthEvent::SendRequest, Some(&mut req), &ctx);

        let actions = table.sweep(&SessionContext { now: NOW + 15, ..self::ctx(&ids) });
        assert!(actions.is_empty());
        assert_eq!(state_of(&table, &id), Some(AuthState::Pending));
        assert!(events.lock().contains(&SessionEvent::Auth(AuthEvent::LifetimeTimeout)));

        table.sweep(&SessionContext { now: NOW + 45, ..self::ctx(&ids) });
        assert!(table.get(&id).is_none());
    }

    #[test]
    fn test_unused_client_session_expires() {
        let ids = Counter(AtomicU32::new(1));
        let ctx = ctx(&ids);
        let table = SessionTable::new(8, "pcscf.ims.test");

        let id = table.create_client_auth_session(None, None, &ctx).id.clone();
        table.sweep(&SessionContext { now: NOW + 30, ..self::ctx(&ids) });
        assert_eq!(state_of(&table, &id), Some(AuthState::Idle));

        let actions = table.sweep(&SessionContext { now: NOW + 60, ..self::ctx(&ids) });
        assert!(actions.is_empty());
        assert!(table.is_empty());
    }
}

//! Application-facing API: building messages, sending them through the
//! router or to a named peer, request and response handlers, and session
//! management.
//!
//! Session lookups return a [`SessionGuard`] that keeps the session's
//! bucket locked. Drop it before sending a message of the same session.

use crate::engine::DiameterEngine;
use crate::registry::{PeerEntry, PeerInput};
use crate::transaction::TransactionCallback;
use cdp_core::diameter::AVP_FLAG_MANDATORY;
use cdp_core::{CdpError, DiameterAvp, DiameterMessage, Result};
use cdp_dict::avp;
use cdp_peer_core::PeerEvent;
use cdp_router_core::select_peer;
use cdp_session_core::{
    start_charging, terminate_auth_session, terminate_cc_acct_session, CcAcctKind, SessionAction,
    SessionCallback, SessionGuard, SessionKind,
};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Returns an answer to send back to the requesting peer, or None
pub type RequestHandler = Arc<dyn Fn(&DiameterMessage) -> Option<DiameterMessage> + Send + Sync>;

pub type ResponseHandler = Arc<dyn Fn(&DiameterMessage) + Send + Sync>;

/// Handlers in registration order
#[derive(Default)]
pub(crate) struct Handlers {
    pub requests: RwLock<Vec<RequestHandler>>,
    pub responses: RwLock<Vec<ResponseHandler>>,
}

impl DiameterEngine {
    /// Request originated by this node: fresh identifiers, Session-Id
    /// first when given, then Origin-Host and Origin-Realm
    pub fn create_request(
        &self,
        command_code: u32,
        application_id: u32,
        session_id: Option<&str>,
    ) -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(
            command_code,
            application_id,
            self.ids.next_hop_by_hop(),
            self.ids.next_end_to_end(),
        );
        if let Some(id) = session_id {
            msg.add_avp(DiameterAvp::from_str(avp::SESSION_ID, AVP_FLAG_MANDATORY, 0, id));
        }
        self.add_origin(&mut msg);
        msg
    }

    /// Answer skeleton for `request` carrying our Origin-Host/Realm
    pub fn create_response(&self, request: &DiameterMessage) -> DiameterMessage {
        let mut answer = DiameterMessage::answer_to(request);
        self.add_origin(&mut answer);
        answer
    }

    fn add_origin(&self, msg: &mut DiameterMessage) {
        msg.add_avp(DiameterAvp::from_str(
            avp::ORIGIN_HOST,
            AVP_FLAG_MANDATORY,
            0,
            &self.config.fqdn,
        ));
        msg.add_avp(DiameterAvp::from_str(
            avp::ORIGIN_REALM,
            AVP_FLAG_MANDATORY,
            0,
            &self.config.realm,
        ));
    }

    /// Register a request handler. Every handler sees every request, in
    /// registration order, and each answer returned is sent.
    pub fn add_request_handler<F>(&self, handler: F)
    where
        F: Fn(&DiameterMessage) -> Option<DiameterMessage> + Send + Sync + 'static,
    {
        self.handlers.requests.write().push(Arc::new(handler));
    }

    /// Register a handler that sees every received answer
    pub fn add_response_handler<F>(&self, handler: F)
    where
        F: Fn(&DiameterMessage) + Send + Sync + 'static,
    {
        self.handlers.responses.write().push(Arc::new(handler));
    }

    /// Route and send `msg` without waiting for an answer
    pub fn send_message(&self, msg: DiameterMessage) -> Result<()> {
        self.transmit(msg, None, None)
    }

    /// Route and send a request; `callback` runs once with the answer or
    /// with `Timeout`
    pub fn send_message_with_callback<F>(&self, msg: DiameterMessage, callback: F) -> Result<()>
    where
        F: FnOnce(Result<DiameterMessage>) + Send + 'static,
    {
        self.transmit(msg, None, Some(Box::new(callback)))
    }

    /// Send `msg` to a named peer, bypassing routing
    pub fn send_message_to_peer(&self, msg: DiameterMessage, peer: &str) -> Result<()> {
        self.transmit(msg, Some(peer), None)
    }

    pub fn send_message_to_peer_with_callback<F>(
        &self,
        msg: DiameterMessage,
        peer: &str,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<DiameterMessage>) + Send + 'static,
    {
        self.transmit(msg, Some(peer), Some(Box::new(callback)))
    }

    /// Route a request and wait for its answer. Returns `Timeout` when the
    /// transaction expires and `ShuttingDown` when the engine stops first.
    pub async fn send_recv_message(&self, msg: DiameterMessage) -> Result<DiameterMessage> {
        self.send_recv(msg, None).await
    }

    pub async fn send_recv_message_to_peer(
        &self,
        msg: DiameterMessage,
        peer: &str,
    ) -> Result<DiameterMessage> {
        self.send_recv(msg, Some(peer)).await
    }

    async fn send_recv(&self, msg: DiameterMessage, peer: Option<&str>) -> Result<DiameterMessage> {
        if !msg.is_request() {
            return Err(CdpError::ProtocolError(
                "only requests can wait for an answer".into(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.transmit(
            msg,
            peer,
            Some(Box::new(move |outcome: Result<DiameterMessage>| {
                let _ = tx.send(outcome);
            })),
        )?;

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(CdpError::ShuttingDown),
            outcome = rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(CdpError::ShuttingDown),
            },
        }
    }

    /// Peer selection, session processing and hand-off to the peer actor.
    /// When the hand-off fails the session keeps its previous state.
    fn transmit(
        &self,
        mut msg: DiameterMessage,
        peer: Option<&str>,
        callback: Option<TransactionCallback>,
    ) -> Result<()> {
        if self.is_shutting_down() {
            return Err(CdpError::ShuttingDown);
        }
        msg.check_lengths()?;
        let session_id = msg.session_id();
        let (entry, routed) = self.resolve(&msg, peer, session_id.as_deref())?;

        let previous = session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
            .map(|session| session.kind.clone());
        let actions = self.sessions.process_sending(&mut msg, &self.session_ctx());
        if let Err(e) = self.forward(&entry, msg, routed, callback) {
            if let (Some(id), Some(kind)) = (session_id.as_deref(), previous) {
                self.restore_session(id, kind);
            }
            return Err(e);
        }

        if routed {
            if let Some(mut session) = session_id.as_deref().and_then(|id| self.sessions.get(id)) {
                if session.sticky_peer.is_none() {
                    session.sticky_peer = Some(entry.fqdn.clone());
                }
            }
        }
        self.execute_session_actions(actions);
        Ok(())
    }

    fn restore_session(&self, id: &str, kind: SessionKind) {
        if let Some(mut session) = self.sessions.get(id) {
            debug!(session_id = id, "message not sent, session state restored");
            session.kind = kind;
        }
    }

    /// The target peer: the named one, which has to be open, or the one
    /// the router selects
    fn resolve(
        &self,
        msg: &DiameterMessage,
        peer: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<(Arc<PeerEntry>, bool)> {
        if let Some(fqdn) = peer {
            let entry = self
                .peers
                .get(fqdn)
                .ok_or_else(|| CdpError::PeerUnavailable(format!("unknown peer {fqdn}")))?;
            if !entry.is_open() {
                return Err(CdpError::PeerUnavailable(format!("peer {fqdn} is not open")));
            }
            return Ok((entry, false));
        }

        let sticky = session_id
            .and_then(|id| self.sessions.get(id))
            .and_then(|session| session.sticky_peer.clone());
        let table = self.routing.load();
        let selection = select_peer(&table, msg, sticky.as_deref(), &self.peers)?;
        let entry = self
            .peers
            .get(&selection.fqdn)
            .ok_or_else(|| CdpError::PeerUnavailable(format!("peer {} vanished", selection.fqdn)))?;
        debug!(peer = %entry.fqdn, by = ?selection.by, "peer selected");
        Ok((entry, true))
    }

    fn forward(
        &self,
        entry: &PeerEntry,
        msg: DiameterMessage,
        routed: bool,
        callback: Option<TransactionCallback>,
    ) -> Result<()> {
        let key = match callback {
            Some(callback) if msg.is_request() => Some(self.transactions.add(
                &msg,
                callback,
                Duration::from_secs(self.config.transaction_timeout_secs),
                true,
            )),
            _ => None,
        };
        if !entry.send(PeerInput::Event(PeerEvent::SendMessage(msg))) {
            if let Some(key) = key {
                self.transactions.drop_transaction(key);
            }
            return Err(CdpError::PeerUnavailable(format!("peer {} is stopped", entry.fqdn)));
        }
        if routed {
            let ordinal = self.selections.fetch_add(1, Ordering::Relaxed) + 1;
            entry.peer.lock().mark_selected(ordinal);
        }
        Ok(())
    }

    /// Send the messages generated by the session state machines. They
    /// already went through the session layer; routed ones follow the
    /// session's sticky peer like any other message of the session.
    pub(crate) fn execute_session_actions(&self, actions: Vec<SessionAction>) {
        for action in actions {
            let SessionAction::Send { msg, peer } = action;
            let command = msg.command_code();
            let session_id = msg.session_id();
            let sent = self
                .resolve(&msg, peer.as_deref(), session_id.as_deref())
                .and_then(|(entry, routed)| self.forward(&entry, msg, routed, None));
            if let Err(e) = sent {
                warn!(command, peer = ?peer, error = %e, "session message not sent");
            }
        }
    }

    /// New stateful client authorization session, returned locked
    pub fn create_client_auth_session(
        &self,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
    ) -> SessionGuard<'_> {
        self.sessions
            .create_client_auth_session(callback, data, &self.session_ctx())
    }

    /// Server authorization session for a received request, returned locked
    pub fn create_server_auth_session(
        &self,
        request: &DiameterMessage,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
    ) -> Result<SessionGuard<'_>> {
        self.sessions
            .create_server_auth_session(request, callback, data, &self.session_ctx())
    }

    /// New credit-control accounting session, returned locked
    pub fn create_cc_acct_session(
        &self,
        kind: CcAcctKind,
        callback: Option<SessionCallback>,
        data: Option<Box<dyn Any + Send>>,
    ) -> SessionGuard<'_> {
        self.sessions.create_cc_acct_session(kind, callback, data)
    }

    /// Look a session up; the guard keeps it locked
    pub fn get_session(&self, id: &str) -> Option<SessionGuard<'_>> {
        self.sessions.get(id)
    }

    /// End a client authorization session with an STR
    pub fn terminate_auth_session(&self, id: &str) -> Result<()> {
        let guard = self.session_or_error(id)?;
        let actions = terminate_auth_session(guard, &self.session_ctx());
        self.execute_session_actions(actions);
        Ok(())
    }

    pub fn terminate_cc_acct_session(&self, id: &str) -> Result<()> {
        terminate_cc_acct_session(self.session_or_error(id)?);
        Ok(())
    }

    /// Remove a session without running its state machine
    pub fn drop_session(&self, id: &str) -> Result<()> {
        self.session_or_error(id)?.drop_session();
        Ok(())
    }

    /// Record the charging start time of a credit-control session
    pub fn start_charging(&self, id: &str) -> Result<()> {
        let mut guard = self.session_or_error(id)?;
        start_charging(&mut guard, chrono::Utc::now().timestamp())
    }

    fn session_or_error(&self, id: &str) -> Result<SessionGuard<'_>> {
        self.sessions
            .get(id)
            .ok_or_else(|| CdpError::InvalidAvpValue {
                code: avp::SESSION_ID,
                reason: format!("unknown session {id}"),
            })
    }
}

// SPDX-License-Identifier: BSD-3-Clause

//! The dispatcher state machine (C9), spec §4.8.
//!
//! One [`Dispatcher`] is built per engagement from a [`ValidatedBunker`] and
//! lives behind a single `Mutex` shared by every connection thread (the
//! concurrency model this workspace uses throughout, rather than an
//! actor/async runtime): each connection thread calls in with the bytes it
//! just read and the dispatcher mutates its own state and pushes reply
//! envelopes onto the relevant connections' outbound channels directly.
//! There is deliberately no return channel back to the caller beyond a log
//! hint — every reply, including ones addressed to the calling connection
//! itself, goes through the same `outbox` path.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use bunker::ValidatedBunker;
use wire::{Body, Envelope, ErrorCode, MessageType, ReplayWindow};

use crate::connection::{ConnectionId, ConnectionState, ListenerClass};
use crate::directory::Directory;
use crate::errors::DispatchError;
use crate::pending::PendingTable;

/// The principal name turret itself signs forwarded/synthetic envelopes
/// with. These envelopes are never signed (Open Question (a), resolved in
/// favor of an explicit unsigned scaffolding principal rather than a
/// detached turret keypair): a repeater or agent receiving one identifies
/// it as dispatcher-originated by this principal and the empty `sig`.
pub const TURRET_PRINCIPAL: &[u8] = b"turret";

/// Whether the calling connection loop should keep reading after
/// `on_envelope` returns. Only two situations demand a close (spec §7): a
/// frame whose envelope didn't even decode (no `request_id` is ever
/// recoverable to reply with), and any failed `register` (a registration
/// failure closes the repeater connection outright).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Close,
}

pub struct Dispatcher {
    bunker: ValidatedBunker,
    directory: Directory,
    replay: ReplayWindow,
    connections: HashMap<ConnectionId, ConnectionState>,
    pending: PendingTable,
    next_id: ConnectionId,
}

impl Dispatcher {
    pub fn new(bunker: ValidatedBunker) -> Self {
        let directory = Directory::new(bunker.actions.clone());
        Self {
            bunker,
            directory,
            replay: ReplayWindow::new(),
            connections: HashMap::new(),
            pending: PendingTable::default(),
            next_id: 1,
        }
    }

    /// Admits a newly accepted connection, or refuses it outright if
    /// [`crate::limits::MAX_CONNECTIONS`] is already reached (spec §5: "...
    /// and/or refuses new connections"). A refusal returns `None`; the
    /// caller has no connection id to reply through and must simply drop
    /// the socket.
    pub fn connect(&mut self, listener_class: ListenerClass, outbox: Sender<Envelope>) -> Option<ConnectionId> {
        if self.connections.len() >= crate::limits::MAX_CONNECTIONS {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.connections
            .insert(id, ConnectionState::new(listener_class, outbox));
        Some(id)
    }

    /// Tears down everything this connection owned: live action bindings if
    /// it was a repeater, and any pending requests on either side of it. A
    /// repeater dropping mid-flight surfaces to the waiting agent as
    /// `NO_REPEATER`, the same code it would have gotten had the repeater
    /// never been live at all (spec §8 scenario 6).
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        self.directory.clear_connection(connection_id);

        for pending in self.pending.drain_for_connection(connection_id) {
            if pending.agent_connection == connection_id {
                continue;
            }
            self.reply_error(
                pending.agent_connection,
                pending.request_id,
                ErrorCode::NoRepeater,
                "repeater disconnected before replying",
            );
        }

        self.connections.remove(&connection_id);
    }

    /// Processes one decoded frame payload from `connection_id`. The
    /// returned [`Outcome`] tells the caller whether to keep reading from
    /// this connection; any reply envelope owed to a peer has already been
    /// pushed onto the appropriate outbox by the time this returns. The
    /// `Result` is for the caller's logging only.
    pub fn on_envelope(
        &mut self,
        connection_id: ConnectionId,
        raw: &[u8],
        now_ms: u64,
    ) -> (Outcome, Result<(), DispatchError>) {
        let envelope = match Envelope::decode(raw) {
            Ok(e) => e,
            Err(_) => {
                // No request_id is recoverable without a decoded envelope;
                // per spec this connection gets no reply at all.
                return (Outcome::Close, Err(DispatchError::BadRequest("envelope did not decode")));
            }
        };

        let principal = match self.bunker.principals.resolve(&envelope.principal) {
            Some(p) => p,
            None => {
                self.reply_error(connection_id, Vec::new(), ErrorCode::Unauthenticated, "unknown principal");
                return (Outcome::Continue, Err(DispatchError::Unauthenticated));
            }
        };
        let principal_class = principal.class;
        let public_key = principal.public_key;

        let canonical =
            wire::sign::canonical_bytes(&envelope.principal, envelope.ts_ms, &envelope.nonce, &envelope.body);
        if !wire::sign::verify(&public_key, &canonical, &envelope.sig) {
            self.reply_error(connection_id, Vec::new(), ErrorCode::Unauthenticated, "bad signature");
            return (Outcome::Continue, Err(DispatchError::Unauthenticated));
        }

        let body = match Body::decode(envelope.msg_type, &envelope.body) {
            Ok(b) => b,
            Err(_) => {
                // As with envelope decode failure, there is no request_id
                // to reply with, so the connection is simply dropped.
                return (Outcome::Close, Err(DispatchError::BadRequest("body did not decode")));
            }
        };

        let request_id = body.request_id().map(<[u8]>::to_vec).unwrap_or_default();

        if let Err(rejection) =
            self.replay
                .check(&envelope.principal, &envelope.nonce, envelope.ts_ms, now_ms)
        {
            // spec §5: exceeding the replay window's cardinality cap is a
            // resource-exhaustion fault (INTERNAL), not a replay (REPLAY).
            let (code, reason) = match rejection {
                wire::replay::Rejection::OutOfSkew => (ErrorCode::Replay, "timestamp outside acceptance window"),
                wire::replay::Rejection::DuplicateNonce => (ErrorCode::Replay, "nonce already seen"),
                wire::replay::Rejection::CapacityExceeded => (ErrorCode::Internal, "replay window at capacity"),
            };
            self.reply_error(connection_id, request_id, code, reason);
            let err = if code == ErrorCode::Internal {
                DispatchError::Internal(reason)
            } else {
                DispatchError::Replay(reason)
            };
            return (Outcome::Continue, Err(err));
        }

        let principal_id = String::from_utf8_lossy(&envelope.principal).into_owned();

        // spec §4.8 step 2: the first valid envelope on a connection pins
        // its principal; every later envelope on that connection must carry
        // the same one.
        let pin_mismatch = match self.connections.get(&connection_id).and_then(|c| c.principal.as_ref()) {
            Some(pinned) => pinned != &principal_id,
            None => false,
        };
        if pin_mismatch {
            self.reply_error(connection_id, request_id, ErrorCode::Unauthenticated, "principal does not match connection's pinned principal");
            return (Outcome::Continue, Err(DispatchError::Unauthenticated));
        }
        if let Some(conn) = self.connections.get_mut(&connection_id) {
            conn.principal.get_or_insert_with(|| principal_id.clone());
        }

        let result = match body {
            Body::Register { repeater_id, actions } => {
                return self.handle_register(connection_id, principal_class, &principal_id, repeater_id, actions)
            }
            Body::Invoke { request_id, action, params } => {
                self.handle_invoke(connection_id, principal_class, &principal_id, request_id, action, params, now_ms)
            }
            Body::Result { request_id, result } => {
                self.handle_result(connection_id, principal_class, request_id, result)
            }
            Body::Error { request_id, code, message } => {
                self.handle_error(connection_id, principal_class, request_id, code, message)
            }
        };
        (Outcome::Continue, result)
    }

    /// A registration failure of any kind closes the repeater connection
    /// (spec §7); only a clean registration leaves it open.
    fn handle_register(
        &mut self,
        connection_id: ConnectionId,
        principal_class: bunker::PrincipalClass,
        principal_id: &str,
        repeater_id: Vec<u8>,
        actions: Vec<Vec<u8>>,
    ) -> (Outcome, Result<(), DispatchError>) {
        if self
            .connections
            .get(&connection_id)
            .map(|c| c.listener_class)
            != Some(ListenerClass::Repeater)
            || principal_class != bunker::PrincipalClass::Repeater
        {
            self.reply_error(connection_id, Vec::new(), ErrorCode::BadRequest, "register is not valid on this connection");
            return (Outcome::Close, Err(DispatchError::BadRequest("register on non-repeater connection")));
        }

        if repeater_id != principal_id.as_bytes() {
            self.reply_error(connection_id, Vec::new(), ErrorCode::BadRequest, "repeater_id does not match principal");
            return (Outcome::Close, Err(DispatchError::BadRequest("repeater_id mismatch")));
        }

        let actions: Vec<String> = actions
            .into_iter()
            .map(|a| String::from_utf8_lossy(&a).into_owned())
            .collect();

        match self.directory.validate_register(principal_id, &actions) {
            Ok(()) => {
                self.directory.commit_register(connection_id, &actions);
                if let Some(conn) = self.connections.get_mut(&connection_id) {
                    conn.registered_actions.extend(actions);
                }
                (Outcome::Continue, Ok(()))
            }
            Err(directory_err) => {
                // spec §4.6/§7: an unknown action is UNKNOWN_ACTION, an
                // ownership mismatch is DENIED, and a conflicting live
                // registration (P7) is BAD_REQUEST — all three still close
                // the connection per spec §7, but the wire code differs.
                let (code, reason) = match &directory_err {
                    crate::directory::RegisterError::UnknownAction(a) => {
                        (ErrorCode::UnknownAction, format!("unknown action {a:?}"))
                    }
                    crate::directory::RegisterError::NotOwner(a) => {
                        (ErrorCode::Denied, format!("not owner of action {a:?}"))
                    }
                    crate::directory::RegisterError::AlreadyLive(a) => {
                        (ErrorCode::BadRequest, format!("action {a:?} already live"))
                    }
                };
                self.reply_error(connection_id, Vec::new(), code, &reason);
                let err = match code {
                    ErrorCode::UnknownAction => DispatchError::UnknownAction,
                    ErrorCode::BadRequest => DispatchError::BadRequest("action already live"),
                    _ => DispatchError::Denied,
                };
                (Outcome::Close, Err(err))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_invoke(
        &mut self,
        connection_id: ConnectionId,
        principal_class: bunker::PrincipalClass,
        principal_id: &str,
        request_id: Vec<u8>,
        action: Vec<u8>,
        params: Vec<u8>,
        now_ms: u64,
    ) -> Result<(), DispatchError> {
        if self
            .connections
            .get(&connection_id)
            .map(|c| c.listener_class)
            != Some(ListenerClass::Agent)
            || principal_class != bunker::PrincipalClass::Agent
        {
            self.reply_error(connection_id, request_id, ErrorCode::BadRequest, "invoke is not valid on this connection");
            return Err(DispatchError::BadRequest("invoke on non-agent connection"));
        }

        let already_seen = self
            .connections
            .get_mut(&connection_id)
            .map(|c| !c.seen_request_ids.insert(request_id.clone()))
            .unwrap_or(true);
        if already_seen {
            self.reply_error(connection_id, request_id, ErrorCode::BadRequest, "duplicate request_id on connection");
            return Err(DispatchError::BadRequest("duplicate request_id"));
        }

        let action_str = String::from_utf8_lossy(&action).into_owned();

        if !self.directory.action_exists(&action_str) {
            self.reply_error(connection_id, request_id, ErrorCode::UnknownAction, "no such action");
            return Err(DispatchError::UnknownAction);
        }

        if !self.bunker.permissions.allows(principal_id, &action_str) {
            self.reply_error(connection_id, request_id, ErrorCode::Denied, "not permitted");
            return Err(DispatchError::Denied);
        }

        let Some(repeater_connection) = self.directory.live_connection_for(&action_str) else {
            self.reply_error(connection_id, request_id, ErrorCode::NoRepeater, "no repeater currently registered");
            return Err(DispatchError::NoRepeater);
        };

        let Some(repeater_outbox) = self
            .connections
            .get(&repeater_connection)
            .map(|c| c.outbox.clone())
        else {
            self.reply_error(connection_id, request_id, ErrorCode::NoRepeater, "repeater connection gone");
            return Err(DispatchError::NoRepeater);
        };

        if self.pending.count_for_agent(connection_id) >= crate::limits::MAX_PENDING_PER_AGENT {
            self.reply_error(connection_id, request_id, ErrorCode::Internal, "too many pending requests for this agent");
            return Err(DispatchError::Internal("pending-per-agent cap exceeded"));
        }

        let forwarded = scaffolding_envelope(
            MessageType::Invoke,
            Body::Invoke {
                request_id: request_id.clone(),
                action,
                params,
            },
        );

        self.pending
            .insert(repeater_connection, connection_id, request_id, now_ms);
        let _ = repeater_outbox.send(forwarded);
        Ok(())
    }

    fn handle_result(
        &mut self,
        connection_id: ConnectionId,
        principal_class: bunker::PrincipalClass,
        request_id: Vec<u8>,
        result: Vec<u8>,
    ) -> Result<(), DispatchError> {
        if principal_class != bunker::PrincipalClass::Repeater {
            return Err(DispatchError::Unauthenticated);
        }

        let Some(pending) = self.pending.take(connection_id, &request_id) else {
            self.reply_error(connection_id, request_id, ErrorCode::BadRequest, "unknown request_id");
            return Err(DispatchError::BadRequest("result for unknown request_id"));
        };

        let reply = scaffolding_envelope(
            MessageType::Result,
            Body::Result {
                request_id: pending.request_id,
                result,
            },
        );
        self.send_to(pending.agent_connection, reply);
        Ok(())
    }

    fn handle_error(
        &mut self,
        connection_id: ConnectionId,
        principal_class: bunker::PrincipalClass,
        request_id: Vec<u8>,
        code: u16,
        message: Vec<u8>,
    ) -> Result<(), DispatchError> {
        if principal_class != bunker::PrincipalClass::Repeater {
            return Err(DispatchError::Unauthenticated);
        }

        let Some(pending) = self.pending.take(connection_id, &request_id) else {
            self.reply_error(connection_id, request_id, ErrorCode::BadRequest, "unknown request_id");
            return Err(DispatchError::BadRequest("error for unknown request_id"));
        };

        let reply = scaffolding_envelope(
            MessageType::Error,
            Body::Error {
                request_id: pending.request_id,
                code,
                message,
            },
        );
        self.send_to(pending.agent_connection, reply);
        Ok(())
    }

    /// Fails every invoke whose deadline has passed with `INTERNAL` (spec
    /// §4.8 step 8). Callers are expected to invoke this periodically, e.g.
    /// once per second from the connection-accept loop's idle tick.
    pub fn sweep_deadlines(&mut self, now_ms: u64) {
        for pending in self.pending.sweep_expired(now_ms) {
            self.reply_error(
                pending.agent_connection,
                pending.request_id,
                ErrorCode::Internal,
                "repeater did not reply before the deadline",
            );
        }
    }

    fn reply_error(&self, connection_id: ConnectionId, request_id: Vec<u8>, code: ErrorCode, message: &str) {
        let envelope = scaffolding_envelope(
            MessageType::Error,
            Body::Error {
                request_id,
                code: code as u16,
                message: message.as_bytes().to_vec(),
            },
        );
        self.send_to(connection_id, envelope);
    }

    fn send_to(&self, connection_id: ConnectionId, envelope: Envelope) {
        if let Some(conn) = self.connections.get(&connection_id) {
            let _ = conn.outbox.send(envelope);
        }
    }
}

/// Builds an unsigned, turret-originated envelope. `ts_ms` is filled with
/// the given value so the canonical bytes a peer might (harmlessly) compute
/// stay well-formed, but these envelopes are never asked to pass signature
/// verification: their principal marks them as dispatcher scaffolding.
fn scaffolding_envelope(msg_type: MessageType, body: Body) -> Envelope {
    Envelope {
        version: 1,
        msg_type,
        principal: TURRET_PRINCIPAL.to_vec(),
        ts_ms: 0,
        nonce: Vec::new(),
        body: body.encode(),
        sig: Vec::new(),
    }
}


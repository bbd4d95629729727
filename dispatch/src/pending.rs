// SPDX-License-Identifier: BSD-3-Clause

//! Pending-request arena: tracks invokes forwarded to a repeater until a
//! matching `result`/`error` comes back, or the deadline sweep gives up on
//! them (spec §4.8 step 8).

use std::collections::HashMap;

use crate::connection::ConnectionId;
use crate::limits::PENDING_REQUEST_TIMEOUT_MS;

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub agent_connection: ConnectionId,
    /// The `request_id` exactly as the agent sent it, echoed back verbatim.
    pub request_id: Vec<u8>,
    pub deadline_ms: u64,
}

#[derive(Default)]
pub struct PendingTable {
    /// Keyed by `(repeater_connection, request_id)`: that pair is unique
    /// because a single repeater connection never reuses a `request_id`
    /// forwarded to it before the first one resolves (the dispatcher only
    /// forwards one invoke per `request_id` per agent at a time).
    by_repeater: HashMap<(ConnectionId, Vec<u8>), PendingRequest>,
}

impl PendingTable {
    pub fn insert(
        &mut self,
        repeater_connection: ConnectionId,
        agent_connection: ConnectionId,
        request_id: Vec<u8>,
        now_ms: u64,
    ) {
        self.by_repeater.insert(
            (repeater_connection, request_id.clone()),
            PendingRequest {
                agent_connection,
                request_id,
                deadline_ms: now_ms + PENDING_REQUEST_TIMEOUT_MS,
            },
        );
    }

    /// Removes and returns the pending request matching a `result`/`error`
    /// reply arriving on `repeater_connection`.
    pub fn take(
        &mut self,
        repeater_connection: ConnectionId,
        request_id: &[u8],
    ) -> Option<PendingRequest> {
        self.by_repeater
            .remove(&(repeater_connection, request_id.to_vec()))
    }

    /// Removes every pending request belonging to a connection that just
    /// disconnected (spec §4.8: "a repeater disconnect fails all of its
    /// in-flight invokes with `INTERNAL`"), returning them so the caller
    /// can notify the waiting agents.
    pub fn drain_for_connection(&mut self, connection: ConnectionId) -> Vec<PendingRequest> {
        let mut taken = Vec::new();
        self.by_repeater.retain(|(repeater, _), pending| {
            if *repeater == connection || pending.agent_connection == connection {
                taken.push(pending.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Removes and returns every pending request whose deadline has
    /// elapsed as of `now_ms`.
    pub fn sweep_expired(&mut self, now_ms: u64) -> Vec<PendingRequest> {
        let mut expired = Vec::new();
        self.by_repeater.retain(|_, pending| {
            if pending.deadline_ms <= now_ms {
                expired.push(pending.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Number of requests currently pending on behalf of `agent_connection`,
    /// across every repeater they were forwarded to. Checked against
    /// [`crate::limits::MAX_PENDING_PER_AGENT`] before a new invoke is
    /// forwarded (spec §5).
    pub fn count_for_agent(&self, agent_connection: ConnectionId) -> usize {
        self.by_repeater
            .values()
            .filter(|p| p.agent_connection == agent_connection)
            .count()
    }

    pub fn len(&self) -> usize {
        self.by_repeater.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_repeater.is_empty()
    }
}

// SPDX-License-Identifier: BSD-3-Clause

//! Action/repeater directory (C7), grounded in `rpcbind`'s service-list
//! registration (`set`/`get_service`): the static side is the bunker's
//! `action -> repeater_id` map; the dynamic side binds an action to the
//! connection currently live for it, refusing a conflicting second
//! registration (I5) or a repeater registering an action it does not own
//! (P6).

use std::collections::HashMap;

use crate::connection::ConnectionId;

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// The action is not present in the bunker at all.
    UnknownAction(String),
    /// `actions[action] != self`: this repeater does not own the action.
    NotOwner(String),
    /// Another connection already holds a live registration for this
    /// action.
    AlreadyLive(String),
}

#[derive(Default)]
pub struct Directory {
    /// `action -> repeater_id`, static for the engagement.
    static_map: HashMap<String, String>,
    /// `action -> connection currently live for it`.
    live: HashMap<String, ConnectionId>,
}

impl Directory {
    pub fn new(static_map: HashMap<String, String>) -> Self {
        Self {
            static_map,
            live: HashMap::new(),
        }
    }

    pub fn action_exists(&self, action: &str) -> bool {
        self.static_map.contains_key(action)
    }

    pub fn live_connection_for(&self, action: &str) -> Option<ConnectionId> {
        self.live.get(action).copied()
    }

    /// Validates a whole `register` batch against the bunker and current
    /// live bindings without committing anything. On success, returns the
    /// action list to commit via [`Directory::commit_register`] — no
    /// partial state is ever applied for a batch that fails midway (spec
    /// §4.6).
    pub fn validate_register<'a>(
        &self,
        repeater_id: &str,
        actions: &'a [String],
    ) -> Result<(), RegisterError> {
        for action in actions {
            match self.static_map.get(action) {
                None => return Err(RegisterError::UnknownAction(action.clone())),
                Some(owner) if owner != repeater_id => {
                    return Err(RegisterError::NotOwner(action.clone()))
                }
                Some(_) => {}
            }

            if self.live.contains_key(action) {
                return Err(RegisterError::AlreadyLive(action.clone()));
            }
        }
        Ok(())
    }

    pub fn commit_register(&mut self, connection: ConnectionId, actions: &[String]) {
        for action in actions {
            self.live.insert(action.clone(), connection);
        }
    }

    /// Clears every live binding owned by `connection` (spec §4.6: "on
    /// repeater disconnect, all of its action bindings are cleared
    /// atomically").
    pub fn clear_connection(&mut self, connection: ConnectionId) {
        self.live.retain(|_, c| *c != connection);
    }
}

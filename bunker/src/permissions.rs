// SPDX-License-Identifier: BSD-3-Clause

//! Permission oracle (C6): exact-match `agent_id -> {action_id}` lookup.
//! Absence of an entry, or absence of the action within it, is a deny.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct PermissionOracle {
    allow: HashMap<String, HashSet<String>>,
}

impl PermissionOracle {
    pub fn new(allow: HashMap<String, HashSet<String>>) -> Self {
        Self { allow }
    }

    pub fn allows(&self, agent_id: &str, action: &str) -> bool {
        self.allow
            .get(agent_id)
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }
}

// SPDX-License-Identifier: BSD-3-Clause

//! Principal registry (C5): `principal_id -> (class, public_key)`.

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalClass {
    Agent,
    Repeater,
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub class: PrincipalClass,
    pub public_key: VerifyingKey,
}

#[derive(Debug, Default)]
pub struct PrincipalRegistry {
    by_id: HashMap<String, Principal>,
}

impl PrincipalRegistry {
    pub fn new(by_id: HashMap<String, Principal>) -> Self {
        Self { by_id }
    }

    pub fn resolve(&self, id: &[u8]) -> Option<&Principal> {
        let id = std::str::from_utf8(id).ok()?;
        self.by_id.get(id)
    }

}

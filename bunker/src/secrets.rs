// SPDX-License-Identifier: BSD-3-Clause

//! Named secret bytes loaded from the bunker. Never transmitted to an
//! agent (I7); zeroized best-effort on drop (spec §9 design notes — this is
//! advisory, not a guarantee against a privileged on-host adversary).

use std::collections::HashMap;
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Default)]
pub struct SecretStore {
    by_name: HashMap<String, Secret>,
}

impl SecretStore {
    pub fn new(by_name: HashMap<String, Secret>) -> Self {
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.by_name.get(name)
    }
}

impl Drop for SecretStore {
    fn drop(&mut self) {
        for secret in self.by_name.values_mut() {
            secret.zeroize();
        }
    }
}

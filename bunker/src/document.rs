// SPDX-License-Identifier: BSD-3-Clause

//! The decrypted bunker shape, §3/§6. Serialized as TOML; unknown keys are
//! rejected at the `serde` layer via `deny_unknown_fields` on every nested
//! table, giving "unknown keys are rejected in v1" for free.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BunkerDocument {
    pub version: u32,
    pub operators: Operators,
    #[serde(default)]
    pub agents: BTreeMap<String, PrincipalEntry>,
    #[serde(default)]
    pub repeaters: BTreeMap<String, PrincipalEntry>,
    #[serde(default)]
    pub actions: BTreeMap<String, String>,
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionEntry>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operators {
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalEntry {
    pub ed25519_pubkey_b64: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionEntry {
    #[serde(default)]
    pub allow: Vec<String>,
}

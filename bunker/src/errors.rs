// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

/// Failures validating a parsed [`crate::document::BunkerDocument`] against
/// invariants I1-I4 (spec §3) plus the key/id well-formedness checks named
/// in §4.4.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported bunker version {0}, expected 1")]
    UnsupportedVersion(u32),

    #[error("operators.recipients must not be empty")]
    NoRecipients,

    #[error("principal id must not be empty")]
    EmptyPrincipalId,

    #[error("action id must not be empty")]
    EmptyActionId,

    #[error("public key for principal {0:?} is not a valid 32-byte ed25519 key")]
    BadPublicKey(String),

    #[error("principal {0:?} is declared as both an agent and a repeater")]
    DuplicatePrincipalClass(String),

    #[error("permissions reference unknown agent {0:?}")]
    UnknownAgentInPermissions(String),

    #[error("permissions for {agent:?} reference unknown action {action:?}")]
    UnknownActionInPermissions { agent: String, action: String },

    #[error("action {action:?} maps to unknown repeater {repeater:?}")]
    UnknownRepeaterForAction { action: String, repeater: String },
}

/// Top-level bunker error surfaced to the lifecycle controller. Loading
/// aborts fire-up with one of these, as a human-readable reason, and no
/// socket is opened (spec §4.4).
#[derive(Debug, Error)]
pub enum BunkerError {
    #[error("reading bunker file: {0}")]
    Io(#[from] std::io::Error),

    #[error("decrypting bunker: {0}")]
    Decrypt(String),

    #[error("bunker plaintext is not valid UTF-8")]
    NotUtf8,

    #[error("parsing bunker document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serializing bunker document: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("validating bunker document: {0}")]
    Validation(#[from] ValidationError),

    #[error("no unlock material available: {0}")]
    Unlock(String),
}

// SPDX-License-Identifier: BSD-3-Clause

//! Validates a parsed [`BunkerDocument`] against invariants I1-I4 (spec §3)
//! and the well-formedness rules from §4.4, producing the indexed,
//! query-ready [`ValidatedBunker`].

use std::collections::{HashMap, HashSet};

use base64::Engine;
use ed25519_dalek::VerifyingKey;

use crate::document::BunkerDocument;
use crate::errors::ValidationError;
use crate::permissions::PermissionOracle;
use crate::principals::{Principal, PrincipalClass, PrincipalRegistry};
use crate::secrets::{Secret, SecretStore};

pub struct ValidatedBunker {
    pub principals: PrincipalRegistry,
    /// `action -> repeater_id`, straight from the bunker (I3 already
    /// verified by the time this is built).
    pub actions: HashMap<String, String>,
    pub permissions: PermissionOracle,
    pub secrets: SecretStore,
}

pub fn validate(doc: &BunkerDocument) -> Result<ValidatedBunker, ValidationError> {
    if doc.version != 1 {
        return Err(ValidationError::UnsupportedVersion(doc.version));
    }

    if doc.operators.recipients.is_empty() {
        return Err(ValidationError::NoRecipients);
    }

    let mut principals = HashMap::new();

    for (id, entry) in &doc.agents {
        if id.is_empty() {
            return Err(ValidationError::EmptyPrincipalId);
        }
        let public_key = decode_pubkey(id, &entry.ed25519_pubkey_b64)?;
        principals.insert(
            id.clone(),
            Principal {
                class: PrincipalClass::Agent,
                public_key,
            },
        );
    }

    for (id, entry) in &doc.repeaters {
        if id.is_empty() {
            return Err(ValidationError::EmptyPrincipalId);
        }
        if principals.contains_key(id) {
            return Err(ValidationError::DuplicatePrincipalClass(id.clone()));
        }
        let public_key = decode_pubkey(id, &entry.ed25519_pubkey_b64)?;
        principals.insert(
            id.clone(),
            Principal {
                class: PrincipalClass::Repeater,
                public_key,
            },
        );
    }

    for (action, repeater_id) in &doc.actions {
        if action.is_empty() {
            return Err(ValidationError::EmptyActionId);
        }
        match principals.get(repeater_id) {
            Some(p) if p.class == PrincipalClass::Repeater => {}
            _ => {
                return Err(ValidationError::UnknownRepeaterForAction {
                    action: action.clone(),
                    repeater: repeater_id.clone(),
                })
            }
        }
    }

    let mut permissions = HashMap::new();
    for (agent_id, entry) in &doc.permissions {
        if !matches!(
            principals.get(agent_id).map(|p| p.class),
            Some(PrincipalClass::Agent)
        ) {
            return Err(ValidationError::UnknownAgentInPermissions(agent_id.clone()));
        }

        let mut allowed = HashSet::new();
        for action in &entry.allow {
            if !doc.actions.contains_key(action) {
                return Err(ValidationError::UnknownActionInPermissions {
                    agent: agent_id.clone(),
                    action: action.clone(),
                });
            }
            allowed.insert(action.clone());
        }
        permissions.insert(agent_id.clone(), allowed);
    }

    let mut secrets = HashMap::new();
    for (name, value) in &doc.secrets {
        secrets.insert(name.clone(), Secret::new(value.clone().into_bytes()));
    }

    Ok(ValidatedBunker {
        principals: PrincipalRegistry::new(principals),
        actions: doc.actions.clone(),
        permissions: PermissionOracle::new(permissions),
        secrets: SecretStore::new(secrets),
    })
}

fn decode_pubkey(principal_id: &str, b64: &str) -> Result<VerifyingKey, ValidationError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| ValidationError::BadPublicKey(principal_id.to_string()))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ValidationError::BadPublicKey(principal_id.to_string()))?;

    VerifyingKey::from_bytes(&bytes).map_err(|_| ValidationError::BadPublicKey(principal_id.to_string()))
}

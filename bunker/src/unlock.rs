// SPDX-License-Identifier: BSD-3-Clause

//! The operator-unlock console contract (spec §6): an external
//! collaborator the core calls into when the host identity fails to
//! decrypt the bunker. This module defines only the trait boundary; the
//! actual console UI is out of scope (spec §1).

use std::path::PathBuf;

use age::secrecy::SecretString;

/// Unlock material the operator supplies, via whatever console front-end
/// the surrounding CLI provides.
pub enum UnlockMaterial {
    Passphrase(SecretString),
    IdentityFile(PathBuf),
}

#[derive(Debug)]
pub struct UnlockDeclined {
    pub reason: String,
}

/// Requests unlock material from the operator. Implementations own the
/// actual prompt; the core only needs an answer or a declination reason.
pub trait UnlockSource {
    fn request_unlock(&self) -> Result<UnlockMaterial, UnlockDeclined>;
}

/// An [`UnlockSource`] that never succeeds, useful when no interactive
/// console is wired up (e.g. a non-interactive service that relies solely
/// on the host identity).
pub struct NoConsole;

impl UnlockSource for NoConsole {
    fn request_unlock(&self) -> Result<UnlockMaterial, UnlockDeclined> {
        Err(UnlockDeclined {
            reason: "no operator console configured".to_string(),
        })
    }
}

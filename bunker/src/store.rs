// SPDX-License-Identifier: BSD-3-Clause

//! Bunker load/save lifecycle (C4), spec §4.4.
//!
//! Load tries the host identity first, then falls back to an
//! operator-supplied [`UnlockSource`]; this two-tier strategy mirrors
//! `ChainSafe-forest`'s `KeyStore::new`, which likewise tries one
//! decryption strategy before falling back to prompting, adapted here from
//! passphrase-encrypted JSON to age-encrypted TOML.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use age::secrecy::SecretString;
use age::{Decryptor, Encryptor, Identity as AgeIdentity};
use log::{info, warn};

use crate::document::BunkerDocument;
use crate::errors::BunkerError;
use crate::unlock::{UnlockMaterial, UnlockSource};
use crate::validate::{self, ValidatedBunker};

pub struct BunkerStore {
    pub document: BunkerDocument,
    pub validated: ValidatedBunker,
}

impl BunkerStore {
    /// Reads and decrypts `path`, then parses and validates the plaintext.
    /// A validation failure aborts fire-up entirely: no partially-valid
    /// store is ever returned.
    pub fn load(
        path: &Path,
        host_identity_path: Option<&Path>,
        unlock: &dyn UnlockSource,
    ) -> Result<Self, BunkerError> {
        let ciphertext = fs::read(path)?;

        let plaintext = match host_identity_path.and_then(|p| try_host_identity(&ciphertext, p)) {
            Some(plaintext) => {
                info!("bunker unlocked with host identity");
                plaintext
            }
            None => {
                warn!("host identity unavailable or failed, falling back to operator unlock");
                decrypt_via_operator(&ciphertext, unlock)?
            }
        };

        let text = String::from_utf8(plaintext).map_err(|_| BunkerError::NotUtf8)?;
        let document: BunkerDocument = toml::from_str(&text)?;
        let validated = validate::validate(&document)?;

        Ok(Self { document, validated })
    }

    /// Re-encrypts the in-memory document back to `path` against its own
    /// `operators.recipients`. Scaffolding for an out-of-scope CLI front
    /// end to call; no mutation commands live in this crate.
    pub fn save(&self, path: &Path) -> Result<(), BunkerError> {
        let text = toml::to_string_pretty(&self.document)?;

        let recipients: Vec<Box<dyn age::Recipient + Send>> = self
            .document
            .operators
            .recipients
            .iter()
            .map(|r| {
                age::x25519::Recipient::from_str(r)
                    .map(|recipient| Box::new(recipient) as Box<dyn age::Recipient + Send>)
                    .map_err(|e| BunkerError::Decrypt(format!("invalid recipient {r:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;

        let encryptor = Encryptor::with_recipients(recipients).ok_or_else(|| {
            BunkerError::Decrypt("no valid recipients to encrypt against".to_string())
        })?;

        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| BunkerError::Decrypt(e.to_string()))?;
        writer
            .write_all(text.as_bytes())
            .map_err(|e| BunkerError::Decrypt(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| BunkerError::Decrypt(e.to_string()))?;

        fs::write(path, ciphertext)?;
        Ok(())
    }
}

fn try_host_identity(ciphertext: &[u8], identity_path: &Path) -> Option<Vec<u8>> {
    let identity_text = fs::read_to_string(identity_path).ok()?;
    let identity = age::x25519::Identity::from_str(identity_text.trim()).ok()?;
    decrypt_with_identities(ciphertext, std::slice::from_ref(&identity)).ok()
}

fn decrypt_via_operator(
    ciphertext: &[u8],
    unlock: &dyn UnlockSource,
) -> Result<Vec<u8>, BunkerError> {
    let material = unlock
        .request_unlock()
        .map_err(|e| BunkerError::Unlock(e.reason))?;

    match material {
        UnlockMaterial::Passphrase(passphrase) => decrypt_with_passphrase(ciphertext, &passphrase),
        UnlockMaterial::IdentityFile(path) => {
            let identity_text = fs::read_to_string(&path)?;
            let identity = age::x25519::Identity::from_str(identity_text.trim())
                .map_err(|e| BunkerError::Decrypt(format!("parsing identity file: {e}")))?;
            decrypt_with_identities(ciphertext, std::slice::from_ref(&identity))
        }
    }
}

fn decrypt_with_identities(
    ciphertext: &[u8],
    identities: &[age::x25519::Identity],
) -> Result<Vec<u8>, BunkerError> {
    let decryptor = Decryptor::new(ciphertext).map_err(|e| BunkerError::Decrypt(e.to_string()))?;

    let Decryptor::Recipients(decryptor) = decryptor else {
        return Err(BunkerError::Decrypt(
            "bunker file is passphrase-encrypted, but an identity was supplied".to_string(),
        ));
    };

    let identity_refs: Vec<&dyn AgeIdentity> =
        identities.iter().map(|i| i as &dyn AgeIdentity).collect();
    let mut reader = decryptor
        .decrypt(identity_refs.into_iter())
        .map_err(|e| BunkerError::Decrypt(e.to_string()))?;

    let mut plaintext = Vec::new();
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| BunkerError::Decrypt(e.to_string()))?;
    Ok(plaintext)
}

fn decrypt_with_passphrase(
    ciphertext: &[u8],
    passphrase: &SecretString,
) -> Result<Vec<u8>, BunkerError> {
    let decryptor = Decryptor::new(ciphertext).map_err(|e| BunkerError::Decrypt(e.to_string()))?;

    let Decryptor::Passphrase(decryptor) = decryptor else {
        return Err(BunkerError::Decrypt(
            "bunker file is recipient-encrypted, but a passphrase was supplied".to_string(),
        ));
    };

    let mut reader = decryptor
        .decrypt(passphrase, None)
        .map_err(|e| BunkerError::Decrypt(e.to_string()))?;

    let mut plaintext = Vec::new();
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| BunkerError::Decrypt(e.to_string()))?;
    Ok(plaintext)
}

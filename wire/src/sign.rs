// SPDX-License-Identifier: BSD-3-Clause

//! Canonical signing bytes and Ed25519 sign/verify, per spec §4.2.
//!
//! The canonical string is a raw byte concatenation, not a general
//! serializer: callers must pass the *exact decoded bytes* of `principal`,
//! `nonce`, and `body` with no re-encoding (no base64, no JSON escaping).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

const SEP: u8 = 0x0A;

/// Builds `<principal> \n <ts_ms as ASCII decimal> \n <nonce> \n <body>`
/// with no trailing separator.
pub fn canonical_bytes(principal: &[u8], ts_ms: u64, nonce: &[u8], body: &[u8]) -> Vec<u8> {
    let ts_ascii = ts_ms.to_string();

    let mut out = Vec::with_capacity(
        principal.len() + 1 + ts_ascii.len() + 1 + nonce.len() + 1 + body.len(),
    );
    out.extend_from_slice(principal);
    out.push(SEP);
    out.extend_from_slice(ts_ascii.as_bytes());
    out.push(SEP);
    out.extend_from_slice(nonce);
    out.push(SEP);
    out.extend_from_slice(body);
    out
}

pub fn sign(key: &SigningKey, canonical: &[u8]) -> [u8; 64] {
    key.sign(canonical).to_bytes()
}

/// Verifies `sig` against `canonical` under `key`. A signature that is not
/// exactly 64 bytes is rejected outright rather than passed to the
/// underlying library.
pub fn verify(key: &VerifyingKey, canonical: &[u8], sig: &[u8]) -> bool {
    let Ok(sig_bytes): Result<[u8; 64], _> = sig.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    key.verify(canonical, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn canonical_bytes_use_literal_separators() {
        let bytes = canonical_bytes(b"corvus", 42, b"n1", b"body");
        assert_eq!(bytes, b"corvus\n42\nn1\nbody");
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let key = SigningKey::generate(&mut OsRng);
        let canonical = canonical_bytes(b"corvus", 1, b"n1", b"hi");
        let sig = sign(&key, &canonical);
        assert!(verify(&key.verifying_key(), &canonical, &sig));
    }

    #[test]
    fn flipping_a_canonical_byte_breaks_verification() {
        let key = SigningKey::generate(&mut OsRng);
        let mut canonical = canonical_bytes(b"corvus", 1, b"n1", b"hi");
        let sig = sign(&key, &canonical);
        canonical[0] ^= 0xFF;
        assert!(!verify(&key.verifying_key(), &canonical, &sig));
    }

    #[test]
    fn flipping_a_signature_byte_breaks_verification() {
        let key = SigningKey::generate(&mut OsRng);
        let canonical = canonical_bytes(b"corvus", 1, b"n1", b"hi");
        let mut sig = sign(&key, &canonical);
        sig[0] ^= 0xFF;
        assert!(!verify(&key.verifying_key(), &canonical, &sig));
    }

    #[test]
    fn short_signature_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let canonical = canonical_bytes(b"corvus", 1, b"n1", b"hi");
        assert!(!verify(&key.verifying_key(), &canonical, &[0u8; 10]));
    }
}

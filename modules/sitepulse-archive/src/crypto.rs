//! Snapshot payload encryption.
//!
//! PBKDF2-HMAC-SHA256 turns the operator's key material into a 256-bit key;
//! payloads are sealed with AES-256-GCM. The random nonce is prepended to
//! the ciphertext, and the GCM tag gives tamper detection for free.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use sitepulse_common::error::SitepulseError;

const PBKDF2_ITERATIONS: u32 = 150_000;
const KEY_LENGTH_BYTES: usize = 32;
const NONCE_LENGTH_BYTES: usize = 12;
const KDF_SALT: &[u8] = b"sitepulse_snapshot_v1";
const MIN_KEY_MATERIAL: usize = 16;

pub struct SnapshotCipher {
    cipher: Aes256Gcm,
}

impl SnapshotCipher {
    /// Derive the AEAD key. Key material shorter than 16 bytes is refused
    /// here, before anything touches the network or the disk.
    pub fn new(key_material: &str) -> Result<Self, SitepulseError> {
        if key_material.len() < MIN_KEY_MATERIAL {
            return Err(SitepulseError::Config(format!(
                "encryption key must be at least {MIN_KEY_MATERIAL} characters"
            )));
        }

        let mut derived = [0u8; KEY_LENGTH_BYTES];
        pbkdf2_hmac::<Sha256>(
            key_material.as_bytes(),
            KDF_SALT,
            PBKDF2_ITERATIONS,
            &mut derived,
        );

        let key = Key::<Aes256Gcm>::from_slice(&derived);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SitepulseError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH_BYTES];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| SitepulseError::SnapshotIo("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH_BYTES + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, SitepulseError> {
        if sealed.len() <= NONCE_LENGTH_BYTES {
            return Err(SitepulseError::SnapshotIo(
                "sealed payload too short".into(),
            ));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH_BYTES);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SitepulseError::SnapshotIo("integrity check failed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_is_refused() {
        assert!(SnapshotCipher::new("short").is_err());
        assert!(SnapshotCipher::new("exactly-16-chars").is_ok());
    }

    #[test]
    fn round_trip() {
        let cipher = SnapshotCipher::new("a-long-enough-key-material").unwrap();
        let sealed = cipher.encrypt(b"snapshot payload").unwrap();
        assert_ne!(&sealed[NONCE_LENGTH_BYTES..], b"snapshot payload");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"snapshot payload");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let cipher = SnapshotCipher::new("a-long-enough-key-material").unwrap();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampering_is_detected() {
        let cipher = SnapshotCipher::new("a-long-enough-key-material").unwrap();
        let mut sealed = cipher.encrypt(b"snapshot payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let a = SnapshotCipher::new("a-long-enough-key-material").unwrap();
        let b = SnapshotCipher::new("a-different-key-material!").unwrap();
        let sealed = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&sealed).is_err());
    }
}

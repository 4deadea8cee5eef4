//! Authenticated encryption of the persisted snapshot.
//!
//! Blob layout (base64): `version (1 byte) || nonce (12 bytes) || ciphertext`.
//! The key is SHA-256 of the configured secret; the associated data pins the
//! blob to this format so a blob from another context fails authentication.

use super::{PersistError, Transform};
use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde_json::Value;
use sha2::{Digest, Sha256};

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const ASSOCIATED_DATA: &[u8] = b"credvault.auth.v1";

pub struct Seal {
    key: SecretBox<[u8; 32]>,
}

impl Seal {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// Encrypts `plaintext` into a base64 blob.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    #[allow(deprecated)]
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, PersistError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|err| PersistError::Crypto(format!("Encryption failure: {err}")))?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        blob.push(FORMAT_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(Base64::encode_string(&blob))
    }

    /// Decrypts a blob produced by [`Seal::seal`].
    ///
    /// # Errors
    /// Returns an error on bad encoding, unknown version, truncation, or a failed
    /// authentication check (wrong key or tampering).
    #[allow(deprecated)]
    pub fn open(&self, blob: &str) -> Result<Vec<u8>, PersistError> {
        let raw = Base64::decode_vec(blob.trim())
            .map_err(|err| PersistError::Format(format!("invalid base64: {err}")))?;

        let Some((&version, rest)) = raw.split_first() else {
            return Err(PersistError::Format("empty blob".to_string()));
        };
        if version != FORMAT_VERSION {
            return Err(PersistError::Format(format!(
                "unsupported blob version {version}"
            )));
        }
        if rest.len() <= NONCE_LEN {
            return Err(PersistError::Format("blob too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.key.expose_secret()));

        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|err| PersistError::Crypto(format!("Decryption failure: {err}")))
    }
}

impl Transform for Seal {
    fn forward(&self, value: Value) -> Result<Value, PersistError> {
        let plaintext = serde_json::to_vec(&value)?;
        Ok(Value::String(self.seal(&plaintext)?))
    }

    fn reverse(&self, value: Value) -> Result<Value, PersistError> {
        let Value::String(blob) = value else {
            return Err(PersistError::Format(
                "expected an encrypted blob".to_string(),
            ));
        };
        let plaintext = self.open(&blob)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn seal(secret: &str) -> Seal {
        Seal::new(&SecretString::from(secret.to_string()))
    }

    #[test]
    fn blob_hides_plaintext() {
        let blob = seal("k1").seal(b"ada@example.com").unwrap();
        assert!(!blob.contains("ada"));
        let raw = Base64::decode_vec(&blob).unwrap();
        assert_eq!(raw[0], FORMAT_VERSION);
    }

    #[test]
    fn nonces_differ_between_writes() {
        let sealer = seal("k1");
        assert_ne!(sealer.seal(b"same").unwrap(), sealer.seal(b"same").unwrap());
    }

    #[test]
    fn wrong_secret_fails() {
        let blob = seal("k1").seal(b"secret").unwrap();
        assert!(matches!(seal("k2").open(&blob), Err(PersistError::Crypto(_))));
    }

    #[test]
    fn tampering_fails() {
        let sealer = seal("k1");
        let mut raw = Base64::decode_vec(&sealer.seal(b"secret").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = Base64::encode_string(&raw);
        assert!(sealer.open(&tampered).is_err());
    }

    #[test]
    fn malformed_blobs_are_format_errors() {
        let sealer = seal("k1");
        assert!(matches!(sealer.open("%%%"), Err(PersistError::Format(_))));
        assert!(matches!(sealer.open(""), Err(PersistError::Format(_))));

        let mut raw = Base64::decode_vec(&sealer.seal(b"x").unwrap()).unwrap();
        raw[0] = 9;
        assert!(matches!(
            sealer.open(&Base64::encode_string(&raw)),
            Err(PersistError::Format(_))
        ));
        assert!(matches!(
            sealer.open(&Base64::encode_string(&[FORMAT_VERSION, 1, 2])),
            Err(PersistError::Format(_))
        ));
    }

    #[test]
    fn transform_requires_string_on_reverse() {
        let sealer = seal("k1");
        let sealed = sealer.forward(json!({"a": 1})).unwrap();
        assert!(sealed.is_string());
        assert_eq!(sealer.reverse(sealed).unwrap(), json!({"a": 1}));
        assert!(sealer.reverse(json!({"a": 1})).is_err());
    }
}

//! Request signing collaborator.
//!
//! The wire envelope is `signed_body=<hex-signature>.<json-payload>`. How the
//! signature is computed is the signer's business; the client only asks for
//! `sign(payload)` and, when the signer reports one, adds
//! `ig_sig_key_version` next to the envelope.

use chrono::Utc;
use sha2::{Digest, Sha256};

/// Signature and password-envelope primitives.
pub trait Signer: Send + Sync {
    /// Hex signature over `payload`.
    fn sign(&self, payload: &str) -> String;

    /// Key version advertised alongside signed bodies, if any.
    fn key_version(&self) -> Option<&str> {
        None
    }

    /// Wrap a plaintext password in the envelope the server expects.
    fn encrypt_password(&self, password: &str) -> String {
        let now = Utc::now().timestamp();
        format!("#PWD_INSTAGRAM:0:{now}:{password}")
    }
}

/// Default signer: hex SHA-256 over `key || payload`.
#[derive(Debug, Clone)]
pub struct KeyedSigner {
    key: Vec<u8>,
    key_version: String,
}

impl KeyedSigner {
    pub fn new(key: impl Into<Vec<u8>>, key_version: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            key_version: key_version.into(),
        }
    }
}

impl Default for KeyedSigner {
    fn default() -> Self {
        Self::new(b"privapi-default-signing-key".to_vec(), "4")
    }
}

impl Signer for KeyedSigner {
    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn key_version(&self) -> Option<&str> {
        Some(&self.key_version)
    }
}

/// Render the `signed_body` envelope value for `payload`.
pub fn signed_body(signer: &dyn Signer, payload: &str) -> String {
    format!("{}.{}", signer.sign(payload), payload)
}

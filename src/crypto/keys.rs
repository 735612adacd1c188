//! Store key derivation.
//!
//! The key is SHA-256 of the application identity string. It is recomputed
//! on every open and never written to disk. Anyone holding the binary can
//! derive it; the envelope stops casual inspection and hand edits of the
//! license file, not reverse engineering.

use sha2::{Digest, Sha256};
use std::fmt;

/// Size of the derived key in bytes.
pub const KEY_SIZE: usize = 32;

/// 256-bit key used for both the HMAC and the AEAD layer.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreKey([u8; KEY_SIZE]);

impl StoreKey {
    /// Derive the key from an application identity string.
    pub fn derive(app_identity: &str) -> Self {
        Self(Sha256::digest(app_identity.as_bytes()).into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

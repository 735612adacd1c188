//! Authenticated file envelope.
//!
//! Layout:
//!
//! ```text
//! [ 32 bytes: HMAC-SHA256(key, nonce || ciphertext) ]
//! [ 16 bytes: AES-256-GCM nonce                     ]
//! [ N bytes : AES-256-GCM ciphertext incl. 16-byte tag ]
//! ```
//!
//! On open the HMAC is checked first, then the AEAD tag. Both must pass.

use crate::crypto::keys::StoreKey;
use crate::LicenseError;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

/// Size of the HMAC prefix.
pub const MAC_SIZE: usize = 32;

/// Size of the AEAD nonce.
pub const NONCE_SIZE: usize = 16;

/// Size of the AEAD authentication tag appended to the ciphertext.
pub const TAG_SIZE: usize = 16;

/// Smallest well-formed envelope (empty plaintext).
pub const MIN_ENVELOPE_SIZE: usize = MAC_SIZE + NONCE_SIZE + TAG_SIZE;

type Aes256Gcm16 = AesGcm<Aes256, U16>;
type HmacSha256 = Hmac<Sha256>;

/// Encrypt and authenticate `plaintext` under a fresh random nonce.
pub fn seal(key: &StoreKey, plaintext: &[u8]) -> Result<Vec<u8>, LicenseError> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| LicenseError::Crypto(format!("bad key length: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| LicenseError::Crypto(e.to_string()))?;

    let tag = compute_mac(key, &nonce_bytes, &ciphertext)?;

    let mut out = Vec::with_capacity(MAC_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&tag);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Verify and decrypt an envelope produced by [`seal`].
///
/// # Errors
/// * `Truncated` - shorter than [`MIN_ENVELOPE_SIZE`]
/// * `IntegrityFailed` - HMAC or AEAD tag mismatch
pub fn open(key: &StoreKey, data: &[u8]) -> Result<Vec<u8>, LicenseError> {
    if data.len() < MIN_ENVELOPE_SIZE {
        return Err(LicenseError::Truncated { len: data.len() });
    }

    let (tag, rest) = data.split_at(MAC_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut mac = new_mac(key)?;
    mac.update(nonce_bytes);
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| LicenseError::IntegrityFailed)?;

    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| LicenseError::Crypto(format!("bad key length: {}", e)))?;

    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| LicenseError::IntegrityFailed)
}

fn new_mac(key: &StoreKey) -> Result<HmacSha256, LicenseError> {
    <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| LicenseError::Crypto(format!("bad HMAC key: {}", e)))
}

fn compute_mac(
    key: &StoreKey,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<[u8; MAC_SIZE], LicenseError> {
    let mut mac = new_mac(key)?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StoreKey {
        StoreKey::derive("envelope-test")
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = seal(&key(), br#"{"activated":true}"#).unwrap();
        assert_eq!(sealed.len(), MIN_ENVELOPE_SIZE + 18);
        assert_eq!(open(&key(), &sealed).unwrap(), br#"{"activated":true}"#);
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let a = seal(&key(), b"same").unwrap();
        let b = seal(&key(), b"same").unwrap();
        assert_ne!(
            a[MAC_SIZE..MAC_SIZE + NONCE_SIZE],
            b[MAC_SIZE..MAC_SIZE + NONCE_SIZE]
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_plaintext_not_visible() {
        let sealed = seal(&key(), b"firstRunTime").unwrap();
        assert!(!sealed.windows(12).any(|w| w == b"firstRunTime"));
    }

    #[test]
    fn test_any_flipped_byte_rejected() {
        let sealed = seal(&key(), b"license payload").unwrap();
        for i in 0..sealed.len() {
            let mut corrupt = sealed.clone();
            corrupt[i] ^= 0x01;
            assert!(
                matches!(open(&key(), &corrupt), Err(LicenseError::IntegrityFailed)),
                "byte {} flip not detected",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = seal(&key(), b"payload").unwrap();
        let other = StoreKey::derive("another-app");
        assert!(matches!(
            open(&other, &sealed),
            Err(LicenseError::IntegrityFailed)
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        let sealed = seal(&key(), b"payload").unwrap();
        assert!(matches!(
            open(&key(), &sealed[..MIN_ENVELOPE_SIZE - 1]),
            Err(LicenseError::Truncated { .. })
        ));
        assert!(matches!(open(&key(), &[]), Err(LicenseError::Truncated { len: 0 })));
    }

    #[test]
    fn test_hmac_checked_over_nonce_and_ciphertext() {
        // AEAD part untouched, only the HMAC prefix is wrong.
        let mut sealed = seal(&key(), b"payload").unwrap();
        sealed[..MAC_SIZE].copy_from_slice(&[0u8; MAC_SIZE]);
        assert!(matches!(
            open(&key(), &sealed),
            Err(LicenseError::IntegrityFailed)
        ));
    }
}

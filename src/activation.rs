//! Activation code verification and device binding.
//!
//! Codes are 16 hex characters, shown as `XXXX-XXXX-XXXX-XXXX`. Comparison
//! always happens on the normalized form: non-alphanumerics stripped,
//! uppercased.
//!
//! Two modes:
//! - direct: the code equals the one configured at build time;
//! - device-bound: the code equals
//!   `first16hex(SHA256(seed ":" secret ":" fingerprint))` for this device,
//!   and the build was configured with that same derived code.
//!
//! Binding is local only. Two machines that each hold their own record for
//! the same code both validate; nothing here can see the other machine.

use crate::errors::ActivationError;
use crate::fingerprint::DeviceFingerprint;
use crate::store::file::LicenseStore;
use crate::store::record::LicenseRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Length of a normalized activation code.
pub const CODE_LENGTH: usize = 16;

/// Strip separators and uppercase.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Render a code as dash-separated groups of four.
pub fn format_code(code: &str) -> String {
    let normalized = normalize_code(code);
    normalized
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Device-bound code for `fingerprint`, normalized.
///
/// `seed` defaults to the fingerprint itself.
pub fn device_code(fingerprint: &DeviceFingerprint, seed: Option<&str>, secret: &str) -> String {
    let seed = seed.unwrap_or(fingerprint.as_str());
    let input = format!("{}:{}:{}", seed, secret, fingerprint.as_str());
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..CODE_LENGTH].to_ascii_uppercase()
}

/// Which verification mode accepted a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMode {
    /// Matched the build-time code directly.
    Direct,
    /// Matched the code derived for this device.
    DeviceBound,
}

/// Checks submitted codes against the build configuration.
#[derive(Debug, Clone)]
pub struct CodeVerifier {
    expected: Option<String>,
    seed: Option<String>,
    secret: String,
    device_bound_only: bool,
}

impl CodeVerifier {
    /// Create a verifier. `expected` is normalized here.
    pub fn new(
        expected: Option<&str>,
        seed: Option<&str>,
        secret: &str,
        device_bound_only: bool,
    ) -> Self {
        Self {
            expected: expected.map(normalize_code).filter(|c| !c.is_empty()),
            seed: seed.map(str::to_string),
            secret: secret.to_string(),
            device_bound_only,
        }
    }

    /// Code this device would need in device-bound mode.
    pub fn device_code(&self, fingerprint: &DeviceFingerprint) -> String {
        device_code(fingerprint, self.seed.as_deref(), &self.secret)
    }

    /// Verify a submitted code for the device `fingerprint`.
    pub fn verify(
        &self,
        submitted: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<CodeMode, ActivationError> {
        let expected = self
            .expected
            .as_deref()
            .ok_or(ActivationError::CodeNotConfigured)?;
        let submitted = normalize_code(submitted);
        if submitted.is_empty() {
            return Err(ActivationError::CodeMismatch);
        }

        let derived = self.device_code(fingerprint);
        let build_is_device_bound = expected == derived;

        if !self.device_bound_only && submitted == expected {
            return Ok(if build_is_device_bound {
                CodeMode::DeviceBound
            } else {
                CodeMode::Direct
            });
        }

        if submitted == derived && build_is_device_bound {
            return Ok(CodeMode::DeviceBound);
        }

        Err(ActivationError::CodeMismatch)
    }
}

/// Result of committing an accepted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new activation record was written.
    Activated,
    /// This device was already activated with this code.
    AlreadyActive,
}

/// Bind an accepted, normalized `code` to `fingerprint` in the store.
///
/// An existing activated record decides the outcome: same code and device is
/// a no-op, same code on another device or another code is refused.
pub fn commit(
    store: &LicenseStore,
    code: &str,
    fingerprint: &DeviceFingerprint,
    now: i64,
) -> Result<CommitOutcome, ActivationError> {
    if let Some(existing) = store.load().filter(|r| r.activated) {
        let same_code = existing.activation_code.as_deref() == Some(code);
        return match (same_code, existing.device_fingerprint == *fingerprint) {
            (true, true) => Ok(CommitOutcome::AlreadyActive),
            (true, false) => {
                warn!(
                    bound_to = existing.device_fingerprint.short(),
                    current = fingerprint.short(),
                    "Activation code already bound to another device"
                );
                Err(ActivationError::BoundToAnotherDevice)
            }
            (false, _) => Err(ActivationError::DifferentCodeActivated),
        };
    }

    let record = LicenseRecord::activated(fingerprint.clone(), code.to_string(), now);
    if !store.save(&record) {
        return Err(ActivationError::StorageWriteFailure);
    }

    info!(device = fingerprint.short(), "Device activated");
    Ok(CommitOutcome::Activated)
}

/// Outcome of an activation attempt as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResult {
    /// Whether the device is now activated.
    pub success: bool,
    /// Human-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActivationResult {
    /// Successful activation.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed activation.
    pub fn failed(error: &ActivationError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::StoreKey;
    use tempfile::TempDir;

    const SECRET: &str = "unit-secret";
    const NOW: i64 = 1_736_942_400_000;

    fn fp(byte: u8) -> DeviceFingerprint {
        DeviceFingerprint::from_digest([byte; 32])
    }

    fn store(dir: &TempDir) -> LicenseStore {
        LicenseStore::open(dir.path(), StoreKey::derive("activation-test")).unwrap()
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("abcd-1234-ef56-7890"), "ABCD1234EF567890");
        assert_eq!(normalize_code(" ab cd_12.34 "), "ABCD1234");
        assert_eq!(normalize_code("---"), "");
    }

    #[test]
    fn test_format_code() {
        assert_eq!(format_code("abcd1234ef567890"), "ABCD-1234-EF56-7890");
        assert_eq!(format_code("ABCD-1234-EF56-7890"), "ABCD-1234-EF56-7890");
        assert_eq!(format_code("abcdef"), "ABCD-EF");
    }

    #[test]
    fn test_device_code_stable_and_shaped() {
        let a = device_code(&fp(1), None, SECRET);
        let b = device_code(&fp(1), None, SECRET);
        assert_eq!(a, b);
        assert_eq!(a.len(), CODE_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(normalize_code(&format_code(&a)), a);
    }

    #[test]
    fn test_device_code_inputs() {
        let fingerprint = fp(1);
        let expected = hex::encode(Sha256::digest(
            format!("{0}:{1}:{0}", fingerprint, SECRET).as_bytes(),
        ))[..16]
            .to_ascii_uppercase();
        assert_eq!(device_code(&fingerprint, None, SECRET), expected);

        assert_ne!(device_code(&fp(1), None, SECRET), device_code(&fp(2), None, SECRET));
        assert_ne!(
            device_code(&fp(1), Some("BATCH-7"), SECRET),
            device_code(&fp(1), None, SECRET)
        );
        assert_ne!(
            device_code(&fp(1), None, SECRET),
            device_code(&fp(1), None, "other-secret")
        );
    }

    #[test]
    fn test_verify_not_configured() {
        let verifier = CodeVerifier::new(None, None, SECRET, false);
        assert_eq!(
            verifier.verify("ABCD-1234-EF56-7890", &fp(1)),
            Err(ActivationError::CodeNotConfigured)
        );
        let blank = CodeVerifier::new(Some("--"), None, SECRET, false);
        assert_eq!(
            blank.verify("ABCD", &fp(1)),
            Err(ActivationError::CodeNotConfigured)
        );
    }

    #[test]
    fn test_verify_direct_mode() {
        let verifier = CodeVerifier::new(Some("abcd-1234-ef56-7890"), None, SECRET, false);
        assert_eq!(verifier.verify("ABCD1234EF567890", &fp(1)), Ok(CodeMode::Direct));
        assert_eq!(verifier.verify("abcd-1234-ef56-7890", &fp(2)), Ok(CodeMode::Direct));
        assert_eq!(
            verifier.verify("ABCD-1234-EF56-7891", &fp(1)),
            Err(ActivationError::CodeMismatch)
        );
        assert_eq!(verifier.verify("", &fp(1)), Err(ActivationError::CodeMismatch));
    }

    #[test]
    fn test_verify_device_bound_mode() {
        let device = fp(3);
        let code = format_code(&device_code(&device, Some("BATCH"), SECRET));
        let verifier = CodeVerifier::new(Some(code.as_str()), Some("BATCH"), SECRET, false);

        assert_eq!(
            verifier.verify(&code.to_lowercase(), &device),
            Ok(CodeMode::DeviceBound)
        );

        // The code derived for another device does not open this build.
        let foreign = device_code(&fp(4), Some("BATCH"), SECRET);
        assert_eq!(
            verifier.verify(&foreign, &device),
            Err(ActivationError::CodeMismatch)
        );
    }

    #[test]
    fn test_device_shaped_code_on_direct_build_falls_back() {
        let device = fp(5);
        let derived = device_code(&device, None, SECRET);
        let verifier = CodeVerifier::new(Some("1111-2222-3333-4444"), None, SECRET, false);

        assert_eq!(
            verifier.verify(&derived, &device),
            Err(ActivationError::CodeMismatch)
        );
        assert_eq!(verifier.verify("1111222233334444", &device), Ok(CodeMode::Direct));
    }

    #[test]
    fn test_device_bound_only_rejects_foreign_build_code() {
        let installer_device = fp(6);
        let other_device = fp(7);
        let build_code = device_code(&installer_device, None, SECRET);
        let strict = CodeVerifier::new(Some(build_code.as_str()), None, SECRET, true);

        assert_eq!(
            strict.verify(&build_code, &installer_device),
            Ok(CodeMode::DeviceBound)
        );
        assert_eq!(
            strict.verify(&build_code, &other_device),
            Err(ActivationError::CodeMismatch)
        );

        let lenient = CodeVerifier::new(Some(build_code.as_str()), None, SECRET, false);
        assert_eq!(lenient.verify(&build_code, &other_device), Ok(CodeMode::Direct));
    }

    #[test]
    fn test_commit_fresh_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(
            commit(&store, "ABCD1234EF567890", &fp(1), NOW),
            Ok(CommitOutcome::Activated)
        );
        assert_eq!(
            commit(&store, "ABCD1234EF567890", &fp(1), NOW + 1_000),
            Ok(CommitOutcome::AlreadyActive)
        );

        let record = store.load().unwrap();
        assert!(record.activated);
        assert_eq!(record.first_run_time, NOW);
        assert_eq!(record.activation_code.as_deref(), Some("ABCD1234EF567890"));
        assert_eq!(record.device_fingerprint, fp(1));
    }

    #[test]
    fn test_commit_same_code_other_device() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        commit(&store, "ABCD1234EF567890", &fp(1), NOW).unwrap();

        assert_eq!(
            commit(&store, "ABCD1234EF567890", &fp(2), NOW),
            Err(ActivationError::BoundToAnotherDevice)
        );
        assert_eq!(store.load().unwrap().device_fingerprint, fp(1));
    }

    #[test]
    fn test_commit_different_code() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        commit(&store, "ABCD1234EF567890", &fp(1), NOW).unwrap();

        for device in [fp(1), fp(2)] {
            assert_eq!(
                commit(&store, "0000111122223333", &device, NOW),
                Err(ActivationError::DifferentCodeActivated)
            );
        }
    }

    #[test]
    fn test_commit_replaces_unactivated_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.save(&LicenseRecord::new(fp(9), NOW - 5_000)));

        assert_eq!(
            commit(&store, "ABCD1234EF567890", &fp(1), NOW),
            Ok(CommitOutcome::Activated)
        );
        let record = store.load().unwrap();
        assert!(record.activated);
        assert_eq!(record.device_fingerprint, fp(1));
    }

    #[test]
    fn test_activation_result_shape() {
        let failed = ActivationResult::failed(&ActivationError::CodeMismatch);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("code mismatch"));
        assert_eq!(
            serde_json::to_string(&ActivationResult::ok()).unwrap(),
            r#"{"success":true}"#
        );
    }
}

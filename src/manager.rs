//! License Manager - the public API of the license core.
//!
//! The `LicenseManager` runs the startup decision for the configured edition:
//! - trial builds initialise a trial on first run, forfeit it on clock
//!   rollback, and re-initialise it when the device changes before expiry;
//! - release builds require an activated record bound to this device.
//!
//! `validate` and `activate` write to the store. `status` computes the same
//! decision without writing. None of them return errors.

use crate::activation::{self, ActivationResult, CodeVerifier, CommitOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::{Edition, LicenseConfig};
use crate::crypto::keys::StoreKey;
use crate::fingerprint::{DeviceFingerprint, FingerprintSource, SystemFingerprint};
use crate::store::file::LicenseStore;
use crate::store::record::LicenseRecord;
use crate::trial::{TrialClock, TrialStatus};
use crate::errors::{ActivationError, LicenseError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Failure reason when the trial record could not be created.
pub const ERR_TRIAL_INIT: &str = "failed to initialize trial";
/// Failure reason when the trial has not been started.
pub const ERR_TRIAL_NOT_STARTED: &str = "trial not initialized";
/// Failure reason for clock rollback.
pub const ERR_CLOCK_TAMPERED: &str = "trial expired: system clock moved backwards";
/// Failure reason for an elapsed trial.
pub const ERR_TRIAL_EXPIRED: &str = "trial expired";
/// Failure reason for an unactivated release build.
pub const ERR_NOT_ACTIVATED: &str = "activation required";
/// Failure reason for a release record bound to another device.
pub const ERR_DEVICE_MISMATCH: &str = "license is bound to another device";

/// License validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether the application may be used.
    pub valid: bool,

    /// Edition this build runs as.
    pub edition: Edition,

    /// Release build without an activation; route to the activation flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_activation: Option<bool>,

    /// Whether the stored fingerprint matches this device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_match: Option<bool>,

    /// Trial countdown (trial edition only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_status: Option<TrialStatus>,

    /// Human-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn new(edition: Edition) -> Self {
        Self {
            valid: false,
            edition,
            needs_activation: None,
            device_match: None,
            trial_status: None,
            error: None,
        }
    }

    fn valid(mut self) -> Self {
        self.valid = true;
        self
    }

    fn invalid(mut self, reason: &str) -> Self {
        self.valid = false;
        self.error = Some(reason.to_string());
        self
    }

    fn with_trial(mut self, status: TrialStatus) -> Self {
        self.trial_status = Some(status);
        self
    }

    fn with_device_match(mut self, matched: bool) -> Self {
        self.device_match = Some(matched);
        self
    }
}

/// Main license manager.
///
/// Create one instance at startup, call [`validate`](Self::validate) once,
/// and keep it for activation attempts.
pub struct LicenseManager {
    config: LicenseConfig,
    clock: Arc<dyn Clock>,
    fingerprint: Arc<dyn FingerprintSource>,
    store: LicenseStore,
    trial: TrialClock,
    verifier: CodeVerifier,
}

impl LicenseManager {
    /// Create a manager storing its record under `dirs::data_dir()`.
    ///
    /// # Errors
    /// Returns an error if configuration validation fails or the store
    /// directory cannot be created.
    pub fn new(config: LicenseConfig) -> Result<Self, LicenseError> {
        config.validate()?;
        let store = LicenseStore::open_namespace(
            &config.store_namespace,
            StoreKey::derive(&config.app_identity),
        )?;
        Ok(Self::with_parts(
            config,
            store,
            Arc::new(SystemClock),
            Arc::new(SystemFingerprint),
        ))
    }

    /// Create a manager on an already opened store.
    pub fn with_store(config: LicenseConfig, store: LicenseStore) -> Result<Self, LicenseError> {
        config.validate()?;
        Ok(Self::with_parts(
            config,
            store,
            Arc::new(SystemClock),
            Arc::new(SystemFingerprint),
        ))
    }

    /// Create a manager with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        config: LicenseConfig,
        store: LicenseStore,
        clock: Arc<dyn Clock>,
        fingerprint: Arc<dyn FingerprintSource>,
    ) -> Result<Self, LicenseError> {
        config.validate()?;
        Ok(Self::with_parts(config, store, clock, fingerprint))
    }

    fn with_parts(
        config: LicenseConfig,
        store: LicenseStore,
        clock: Arc<dyn Clock>,
        fingerprint: Arc<dyn FingerprintSource>,
    ) -> Self {
        let trial = TrialClock::new(config.trial);
        let verifier = CodeVerifier::new(
            config.expected_code.as_deref(),
            config.activation_seed.as_deref(),
            &config.activation_secret,
            config.device_bound_only,
        );
        Self {
            config,
            clock,
            fingerprint,
            store,
            trial,
            verifier,
        }
    }

    /// Replace the fingerprint source, e.g. with a
    /// [`CachedFingerprint`](crate::fingerprint::CachedFingerprint).
    pub fn with_fingerprint_source(mut self, source: Arc<dyn FingerprintSource>) -> Self {
        self.fingerprint = source;
        self
    }

    /// Run the startup license decision. Writes to the store.
    pub fn validate(&self) -> ValidationResult {
        let fingerprint = self.fingerprint.fingerprint();
        let result = match self.config.edition {
            Edition::Trial => self.validate_trial(&fingerprint),
            Edition::Release => self.validate_release(&fingerprint),
        };

        info!(
            edition = %result.edition,
            valid = result.valid,
            reason = result.error.as_deref().unwrap_or("ok"),
            "License validated"
        );
        result
    }

    /// The same decision as [`validate`](Self::validate) without writing.
    pub fn status(&self) -> ValidationResult {
        let fingerprint = self.fingerprint.fingerprint();
        let now = self.clock.now_millis();
        let result = ValidationResult::new(self.config.edition);

        match self.config.edition {
            Edition::Trial => {
                let Some(record) = self.store.load() else {
                    return result
                        .with_trial(TrialStatus::uninitialized())
                        .invalid(ERR_TRIAL_NOT_STARTED);
                };
                let status = self.trial.evaluate(&record, now);
                let matched = record.device_fingerprint == fingerprint;
                let result = result.with_device_match(matched);

                if status.tampered {
                    result.with_trial(status).invalid(ERR_CLOCK_TAMPERED)
                } else if status.expired {
                    result.with_trial(status).invalid(ERR_TRIAL_EXPIRED)
                } else if !matched {
                    // validate() would start a fresh window on this device.
                    let fresh = LicenseRecord::new(fingerprint, now);
                    result.with_trial(self.trial.evaluate(&fresh, now)).valid()
                } else {
                    result.with_trial(status).valid()
                }
            }
            Edition::Release => match self.store.load().filter(|r| r.activated) {
                None => not_activated(result),
                Some(record) if record.device_fingerprint != fingerprint => result
                    .with_device_match(false)
                    .invalid(ERR_DEVICE_MISMATCH),
                Some(_) => result.with_device_match(true).valid(),
            },
        }
    }

    /// Attempt activation with a user-entered code.
    ///
    /// Trial builds refuse every code and leave the trial record untouched.
    pub fn activate(&self, code: &str) -> ActivationResult {
        if self.config.edition == Edition::Trial {
            let e = ActivationError::TrialEdition;
            warn!(error = %e, "Activation refused");
            return ActivationResult::failed(&e);
        }

        let fingerprint = self.fingerprint.fingerprint();

        let mode = match self.verifier.verify(code, &fingerprint) {
            Ok(mode) => mode,
            Err(e) => {
                warn!(error = %e, "Activation code rejected");
                return ActivationResult::failed(&e);
            }
        };

        let normalized = activation::normalize_code(code);
        match activation::commit(&self.store, &normalized, &fingerprint, self.clock.now_millis())
        {
            Ok(CommitOutcome::Activated) => {
                info!(mode = ?mode, "Activation committed");
                ActivationResult::ok()
            }
            Ok(CommitOutcome::AlreadyActive) => ActivationResult::ok(),
            Err(e) => {
                warn!(error = %e, "Activation refused");
                ActivationResult::failed(&e)
            }
        }
    }

    /// Delete the license record. Returns `false` if there was none.
    pub fn reset(&self) -> bool {
        let removed = self.store.delete();
        if removed {
            info!("License record reset");
        }
        removed
    }

    /// Fingerprint of the current device.
    pub fn fingerprint(&self) -> DeviceFingerprint {
        self.fingerprint.fingerprint()
    }

    /// Device-bound activation code for this device, formatted for display.
    pub fn device_code(&self) -> String {
        activation::format_code(&self.verifier.device_code(&self.fingerprint()))
    }

    /// Get the current configuration.
    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    fn validate_release(&self, fingerprint: &DeviceFingerprint) -> ValidationResult {
        let result = ValidationResult::new(Edition::Release);

        let Some(mut record) = self.store.load().filter(|r| r.activated) else {
            return not_activated(result);
        };

        if record.device_fingerprint != *fingerprint {
            warn!(
                bound_to = record.device_fingerprint.short(),
                current = fingerprint.short(),
                "Activated license belongs to another device"
            );
            return result
                .with_device_match(false)
                .invalid(ERR_DEVICE_MISMATCH);
        }

        record.last_check_time = self.clock.now_millis();
        if !self.store.save(&record) {
            warn!("Failed to persist license check time");
        }
        result.with_device_match(true).valid()
    }

    fn validate_trial(&self, fingerprint: &DeviceFingerprint) -> ValidationResult {
        let result = ValidationResult::new(Edition::Trial);

        let mut record = match self.store.load() {
            Some(record) => record,
            None => match self.start_trial(fingerprint) {
                Some(record) => record,
                None => return result.invalid(ERR_TRIAL_INIT),
            },
        };

        let status = self.trial.check(&self.store, &mut record, self.clock.as_ref());
        if status.tampered {
            return result.with_trial(status).invalid(ERR_CLOCK_TAMPERED);
        }
        if status.expired {
            return result.with_trial(status).invalid(ERR_TRIAL_EXPIRED);
        }

        if record.device_fingerprint != *fingerprint {
            info!(
                previous = record.device_fingerprint.short(),
                current = fingerprint.short(),
                "Device changed during trial, starting a new trial window"
            );
            self.store.delete();
            let Some(mut fresh) = self.start_trial(fingerprint) else {
                return result.with_device_match(false).invalid(ERR_TRIAL_INIT);
            };
            let status = self.trial.check(&self.store, &mut fresh, self.clock.as_ref());
            return result.with_device_match(false).with_trial(status).valid();
        }

        result.with_device_match(true).with_trial(status).valid()
    }

    fn start_trial(&self, fingerprint: &DeviceFingerprint) -> Option<LicenseRecord> {
        let record = LicenseRecord::new(fingerprint.clone(), self.clock.now_millis());
        if !self.store.save(&record) {
            return None;
        }
        info!(device = fingerprint.short(), "Trial started");
        Some(record)
    }
}

fn not_activated(result: ValidationResult) -> ValidationResult {
    let mut result = result.invalid(ERR_NOT_ACTIVATED);
    result.needs_activation = Some(true);
    result
}

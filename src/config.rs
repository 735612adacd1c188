//! Build-time license configuration.

use crate::trial::{TrialUnit, TrialWindow};
use crate::LicenseError;
use std::fmt;
use std::str::FromStr;

/// Default static secret mixed into device-bound activation codes.
pub const DEFAULT_ACTIVATION_SECRET: &str = "kiosk-license-device-binding";

/// Which state machine the validator runs. Fixed per build, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    /// Time-limited trial, auto-initialised on first run.
    Trial,
    /// Full edition, usable only after activation.
    Release,
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edition::Trial => f.write_str("trial"),
            Edition::Release => f.write_str("release"),
        }
    }
}

impl FromStr for Edition {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(Edition::Trial),
            "release" => Ok(Edition::Release),
            other => Err(LicenseError::ConfigError(format!(
                "unknown edition '{}' (expected trial or release)",
                other
            ))),
        }
    }
}

/// Configuration for the license core.
///
/// These values are normally baked in at build time; see
/// [`LicenseConfig::from_build_env`].
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    /// Application identity string. The store key is derived from it, so it
    /// must not change between releases that share a license file.
    pub app_identity: String,

    /// Directory name under `dirs::data_dir()` holding the license file.
    pub store_namespace: String,

    /// Trial or release build.
    pub edition: Edition,

    /// Length of the trial window.
    pub trial: TrialWindow,

    /// Activation code the build accepts (direct or device-bound).
    pub expected_code: Option<String>,

    /// Base seed for device-bound codes. `None` seeds with the fingerprint.
    pub activation_seed: Option<String>,

    /// Static secret mixed into device-bound codes.
    pub activation_secret: String,

    /// Refuse direct-match codes; only the code derived for this device
    /// activates.
    pub device_bound_only: bool,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            app_identity: "kiosk-license".to_string(),
            store_namespace: "kiosk-license".to_string(),
            edition: Edition::Trial,
            trial: TrialWindow::new(7, TrialUnit::Days),
            expected_code: None,
            activation_seed: None,
            activation_secret: DEFAULT_ACTIVATION_SECRET.to_string(),
            device_bound_only: false,
        }
    }
}

impl LicenseConfig {
    /// Configuration captured from the build environment.
    ///
    /// Reads `KIOSK_EDITION`, `KIOSK_TRIAL_DURATION`, `KIOSK_TRIAL_UNIT`,
    /// `KIOSK_ACTIVATION_CODE` and `KIOSK_ACTIVATION_SEED` as they were set
    /// when the crate was compiled.
    pub fn from_build_env() -> Result<Self, LicenseError> {
        Self::from_lookup(|name| {
            let value = match name {
                "KIOSK_EDITION" => option_env!("KIOSK_EDITION"),
                "KIOSK_TRIAL_DURATION" => option_env!("KIOSK_TRIAL_DURATION"),
                "KIOSK_TRIAL_UNIT" => option_env!("KIOSK_TRIAL_UNIT"),
                "KIOSK_ACTIVATION_CODE" => option_env!("KIOSK_ACTIVATION_CODE"),
                "KIOSK_ACTIVATION_SEED" => option_env!("KIOSK_ACTIVATION_SEED"),
                _ => None,
            };
            value.map(str::to_string)
        })
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset variables keep their [`Default`] value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LicenseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(edition) = lookup("KIOSK_EDITION") {
            config.edition = edition.parse()?;
        }

        if let Some(duration) = lookup("KIOSK_TRIAL_DURATION") {
            config.trial.duration = duration.trim().parse().map_err(|e| {
                LicenseError::ConfigError(format!(
                    "KIOSK_TRIAL_DURATION '{}' is not a number: {}",
                    duration, e
                ))
            })?;
        }

        if let Some(unit) = lookup("KIOSK_TRIAL_UNIT") {
            config.trial.unit = unit.parse()?;
        }

        config.expected_code = lookup("KIOSK_ACTIVATION_CODE").filter(|c| !c.trim().is_empty());
        config.activation_seed = lookup("KIOSK_ACTIVATION_SEED").filter(|s| !s.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LicenseError> {
        if self.app_identity.is_empty() {
            return Err(LicenseError::ConfigError(
                "app_identity cannot be empty".to_string(),
            ));
        }
        if self.store_namespace.is_empty() {
            return Err(LicenseError::ConfigError(
                "store_namespace cannot be empty".to_string(),
            ));
        }
        if self.trial.duration == 0 {
            return Err(LicenseError::ConfigError(
                "trial duration must be positive".to_string(),
            ));
        }
        if self.activation_secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "activation_secret cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

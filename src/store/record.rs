//! The persisted license record.
//!
//! Serialized as camelCase JSON inside the encrypted envelope. The record
//! carries an explicit schema version; records written before the field
//! existed deserialize as version 0 and are upgraded on load.

use crate::fingerprint::DeviceFingerprint;
use crate::LicenseError;
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The single persisted unit of license state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// Record layout version.
    #[serde(default)]
    pub schema_version: u32,

    /// When the trial or license was first established (ms epoch).
    pub first_run_time: i64,

    /// Fingerprint captured when the record was created.
    pub device_fingerprint: DeviceFingerprint,

    /// Most recent successful check (ms epoch).
    pub last_check_time: i64,

    /// Normalized activation code accepted at activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_code: Option<String>,

    /// True once a release build has been activated.
    #[serde(default)]
    pub activated: bool,
}

impl LicenseRecord {
    /// A fresh, unactivated record bound to `fingerprint` at `now`.
    pub fn new(fingerprint: DeviceFingerprint, now: i64) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            first_run_time: now,
            device_fingerprint: fingerprint,
            last_check_time: now,
            activation_code: None,
            activated: false,
        }
    }

    /// An activated record for `code` bound to `fingerprint` at `now`.
    pub fn activated(fingerprint: DeviceFingerprint, code: String, now: i64) -> Self {
        Self {
            activation_code: Some(code),
            activated: true,
            ..Self::new(fingerprint, now)
        }
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, LicenseError> {
        serde_json::to_string(self)
            .map_err(|e| LicenseError::RecordFormat(format!("Failed to serialize record: {}", e)))
    }

    /// Deserialize a record from JSON and bring it to the current schema.
    pub fn from_json(json: &str) -> Result<Self, LicenseError> {
        let record: Self = serde_json::from_str(json)
            .map_err(|e| LicenseError::RecordFormat(format!("Failed to parse record: {}", e)))?;
        record.migrate()
    }

    fn migrate(mut self) -> Result<Self, LicenseError> {
        if self.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(LicenseError::UnsupportedSchema {
                found: self.schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        // 0 -> 1: field added, layout unchanged.
        if self.schema_version == 0 {
            self.schema_version = 1;
        }
        Ok(self)
    }
}

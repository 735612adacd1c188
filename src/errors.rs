//! Error types for the license core.

use thiserror::Error;

/// Internal failures of the license core.
///
/// These never cross the public validation/activation boundary; the store
/// and manager log them and fold them into result values.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// License file I/O failed.
    #[error("Store I/O error: {0}")]
    StoreIO(String),

    /// HMAC or AEAD authentication failed.
    #[error("License file integrity check failed")]
    IntegrityFailed,

    /// File is shorter than the envelope header.
    #[error("License file truncated ({len} bytes)")]
    Truncated {
        /// Length of the data that was read.
        len: usize,
    },

    /// Encryption could not be performed.
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Record (de)serialization failed.
    #[error("Record format error: {0}")]
    RecordFormat(String),

    /// Record was written by a newer schema than this build understands.
    #[error("Unsupported record schema version {found} (max {supported})")]
    UnsupportedSchema {
        /// Version found in the file.
        found: u32,
        /// Highest version this build reads.
        supported: u32,
    },
}

/// Reasons an activation attempt is refused.
///
/// The `Display` text is what the activation screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// The build carries no expected activation code.
    #[error("code not configured")]
    CodeNotConfigured,

    /// The submitted code failed every verification mode.
    #[error("code mismatch")]
    CodeMismatch,

    /// This code is already bound to a different fingerprint.
    #[error("already bound to another device")]
    BoundToAnotherDevice,

    /// This device is already activated with another code.
    #[error("device already activated with different code")]
    DifferentCodeActivated,

    /// The activation record could not be written.
    #[error("storage write failure")]
    StorageWriteFailure,

    /// Trial builds never bind an activation.
    #[error("activation not available in trial edition")]
    TrialEdition,
}

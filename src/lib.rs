//! # kiosk-license
//!
//! **Offline trial and activation enforcement for kiosk deployments.**
//!
//! The crate decides, once per startup, whether the application may run:
//!
//! - **Device fingerprint**: SHA-256 over hostname, platform, architecture
//!   and external IPv4 MAC addresses (plus processor ID and machine GUID on
//!   Windows)
//! - **Encrypted license file**: AES-256-GCM inside an HMAC-SHA256 envelope;
//!   any edit or corruption reads back as "no license"
//! - **Trial clock**: fixed window from first run; moving the system clock
//!   behind the last check forfeits the trial
//! - **Activation codes**: direct or device-bound 16-hex-digit codes, bound
//!   to the first device that activates locally
//!
//! ## Quickstart
//!
//! ```no_run
//! use kiosk_license::{Edition, LicenseConfig, LicenseManager};
//!
//! fn main() -> Result<(), kiosk_license::LicenseError> {
//!     let config = LicenseConfig {
//!         app_identity: "quiz-kiosk".to_string(),
//!         store_namespace: "quiz-kiosk".to_string(),
//!         edition: Edition::Release,
//!         expected_code: Some("ABCD-1234-EF56-7890".to_string()),
//!         ..LicenseConfig::default()
//!     };
//!
//!     let manager = LicenseManager::new(config)?;
//!     let result = manager.validate();
//!
//!     if result.needs_activation == Some(true) {
//!         let outcome = manager.activate("abcd-1234-ef56-7890");
//!         println!("activated: {}", outcome.success);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! The store key is derived from the application identity string, which
//! ships inside the binary. The scheme stops casual inspection, hand edits
//! and copying of the license file between machines. It does **not** stop a
//! user with admin rights who reverse-engineers the binary.
//!
//! There is no license server. A code bound on one machine is only refused
//! on a machine whose local record already names a different device or
//! code; two machines that each activate the same direct-mode code
//! independently both validate.
//!
//! One process per device is assumed. Concurrent writers to the same
//! license file are not coordinated.

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Device identity
pub mod fingerprint;

// Storage layer
pub mod store;

// License logic
pub mod activation;
pub mod trial;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use activation::{format_code, normalize_code, ActivationResult};
pub use clock::{Clock, SystemClock};
pub use config::{Edition, LicenseConfig};
pub use errors::{ActivationError, LicenseError};
pub use fingerprint::{
    derive_fingerprint, CachedFingerprint, DeviceFingerprint, FingerprintSource,
    StaticFingerprint, SystemFingerprint,
};
pub use manager::{LicenseManager, ValidationResult};
pub use store::file::LicenseStore;
pub use store::record::LicenseRecord;
pub use trial::{RemainingTime, TrialStatus, TrialUnit, TrialWindow};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;

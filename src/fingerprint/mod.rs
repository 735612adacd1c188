//! Device fingerprinting for license binding.
//!
//! A fingerprint is the SHA-256 of a canonical JSON rendering of stable
//! machine attributes: hostname, platform, architecture and the MAC
//! addresses of external IPv4 interfaces. On Windows the processor ID and
//! machine GUID are added when they can be read.
//!
//! The JSON object is built from a `serde_json::Map`, which keeps keys in
//! sorted order, and the MAC list is sorted before hashing. The same machine
//! therefore always yields the same digest.

mod platform;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit device digest rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    /// Wrap a raw SHA-256 digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Parse a 64-character hex fingerprint. Uppercase input is lowered.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Machine attributes that feed the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintAttributes {
    /// Host name.
    pub hostname: String,
    /// OS platform identifier (`std::env::consts::OS`).
    pub platform: String,
    /// CPU architecture identifier (`std::env::consts::ARCH`).
    pub arch: String,
    /// MACs of non-loopback interfaces carrying an IPv4 address, any order.
    pub macs: Vec<String>,
    /// Processor ID (Windows only).
    pub cpu_id: Option<String>,
    /// Machine GUID (Windows only).
    pub machine_guid: Option<String>,
}

impl FingerprintAttributes {
    /// Collect attributes from the running machine.
    pub fn collect() -> Self {
        let (cpu_id, machine_guid) = platform::windows_ids();
        Self {
            hostname: platform::host_name(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            macs: platform::ipv4_macs(),
            cpu_id,
            machine_guid,
        }
    }

    /// Canonical JSON: sorted keys, sorted MAC list, absent fields omitted.
    pub fn canonical_json(&self) -> String {
        let mut macs = self.macs.clone();
        macs.sort();

        let mut map = serde_json::Map::new();
        map.insert("arch".into(), self.arch.clone().into());
        map.insert("hostname".into(), self.hostname.clone().into());
        map.insert("macs".into(), macs.into());
        map.insert("platform".into(), self.platform.clone().into());
        if let Some(cpu_id) = &self.cpu_id {
            map.insert("cpuId".into(), cpu_id.clone().into());
        }
        if let Some(guid) = &self.machine_guid {
            map.insert("machineGuid".into(), guid.clone().into());
        }

        serde_json::Value::Object(map).to_string()
    }
}

/// Compute the fingerprint for a known attribute set.
pub fn fingerprint_from_attributes(attrs: &FingerprintAttributes) -> DeviceFingerprint {
    let digest = Sha256::digest(attrs.canonical_json().as_bytes());
    DeviceFingerprint::from_digest(digest.into())
}

/// Derive the fingerprint of the running machine.
///
/// Never fails; unreadable attributes are left out.
pub fn derive_fingerprint() -> DeviceFingerprint {
    fingerprint_from_attributes(&FingerprintAttributes::collect())
}

/// Source of the current device fingerprint.
pub trait FingerprintSource: Send + Sync {
    /// Fingerprint of the current device.
    fn fingerprint(&self) -> DeviceFingerprint;
}

/// Re-derives the fingerprint on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFingerprint;

impl FingerprintSource for SystemFingerprint {
    fn fingerprint(&self) -> DeviceFingerprint {
        derive_fingerprint()
    }
}

/// Derives the fingerprint once and reuses it for the process lifetime.
#[derive(Debug, Default)]
pub struct CachedFingerprint {
    cell: OnceCell<DeviceFingerprint>,
}

impl CachedFingerprint {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintSource for CachedFingerprint {
    fn fingerprint(&self) -> DeviceFingerprint {
        self.cell.get_or_init(derive_fingerprint).clone()
    }
}

/// A fingerprint supplied by the host.
#[derive(Debug, Clone)]
pub struct StaticFingerprint(pub DeviceFingerprint);

impl FingerprintSource for StaticFingerprint {
    fn fingerprint(&self) -> DeviceFingerprint {
        self.0.clone()
    }
}

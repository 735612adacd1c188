//! Encrypted license file with atomic writes.
//!
//! Stores one record at `<dir>/license.dat`, normally under
//! `dirs::data_dir()/<namespace>/`. Writes go to a temp file that is then
//! renamed over the target.
//!
//! `save`, `load` and `delete` never return errors. Failures are logged and
//! reported as `false` / `None`. A missing file and a file that fails
//! authentication both load as `None`, so a caller cannot tell them apart.

use crate::crypto::envelope;
use crate::crypto::keys::StoreKey;
use crate::store::record::LicenseRecord;
use crate::LicenseError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LICENSE_FILE: &str = "license.dat";
const TEMP_FILE: &str = "license.dat.tmp";

/// Handle on the license file. Owns the file exclusively.
#[derive(Debug)]
pub struct LicenseStore {
    /// Directory holding the license file.
    dir: PathBuf,
    key: StoreKey,
}

impl LicenseStore {
    /// Open the store under `dirs::data_dir()/<namespace>/`.
    pub fn open_namespace(namespace: &str, key: StoreKey) -> Result<Self, LicenseError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| LicenseError::StoreIO("Could not find data directory".to_string()))?;
        Self::open(base_dir.join(namespace), key)
    }

    /// Open the store in a specific directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>, key: StoreKey) -> Result<Self, LicenseError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| LicenseError::StoreIO(format!("Failed to create store dir: {}", e)))?;
        debug!(dir = %dir.display(), "License store opened");
        Ok(Self { dir, key })
    }

    /// End use of the store.
    pub fn close(self) {
        debug!(dir = %self.dir.display(), "License store closed");
    }

    /// Path of the license file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(LICENSE_FILE)
    }

    /// Encrypt and atomically write `record`. Returns `false` on any failure.
    pub fn save(&self, record: &LicenseRecord) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save license record");
                false
            }
        }
    }

    /// Read and decrypt the record. `None` if absent or not authentic.
    pub fn load(&self) -> Option<LicenseRecord> {
        match self.try_load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable license record");
                None
            }
        }
    }

    /// Remove the license file. Returns `false` if there was nothing to
    /// remove or removal failed.
    pub fn delete(&self) -> bool {
        match fs::remove_file(self.path()) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(error = %e, "Failed to delete license record");
                false
            }
        }
    }

    fn try_save(&self, record: &LicenseRecord) -> Result<(), LicenseError> {
        let json = record.to_json()?;
        let sealed = envelope::seal(&self.key, json.as_bytes())?;

        let temp_path = self.dir.join(TEMP_FILE);
        fs::write(&temp_path, &sealed)
            .map_err(|e| LicenseError::StoreIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, self.path()).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            LicenseError::StoreIO(format!("Failed to rename license file: {}", e))
        })?;

        Ok(())
    }

    fn try_load(&self) -> Result<Option<LicenseRecord>, LicenseError> {
        let data = match fs::read(self.path()) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LicenseError::StoreIO(format!(
                    "Failed to read license file: {}",
                    e
                )))
            }
        };

        let plaintext = envelope::open(&self.key, &data)?;
        let json = String::from_utf8(plaintext)
            .map_err(|e| LicenseError::RecordFormat(format!("Record is not UTF-8: {}", e)))?;

        LicenseRecord::from_json(&json).map(Some)
    }
}

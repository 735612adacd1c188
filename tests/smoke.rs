//! End-to-end checks through the public API.

use kiosk_license::crypto::keys::StoreKey;
use kiosk_license::{
    format_code, DeviceFingerprint, Edition, LicenseConfig, LicenseManager, LicenseStore,
    StaticFingerprint, TrialUnit, TrialWindow,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn config(edition: Edition, code: Option<&str>) -> LicenseConfig {
    LicenseConfig {
        app_identity: "smoke-kiosk".to_string(),
        store_namespace: "smoke-kiosk".to_string(),
        edition,
        trial: TrialWindow::new(5, TrialUnit::Minutes),
        expected_code: code.map(str::to_string),
        ..LicenseConfig::default()
    }
}

fn manager(config: LicenseConfig, dir: &TempDir, device: u8) -> LicenseManager {
    let store = LicenseStore::open(dir.path(), StoreKey::derive(&config.app_identity)).unwrap();
    LicenseManager::with_store(config, store)
        .unwrap()
        .with_fingerprint_source(Arc::new(StaticFingerprint(DeviceFingerprint::from_digest(
            [device; 32],
        ))))
}

#[test]
fn fresh_trial_is_valid() {
    let dir = TempDir::new().unwrap();
    let result = manager(config(Edition::Trial, None), &dir, 1).validate();

    assert!(result.valid);
    let status = result.trial_status.unwrap();
    assert!(!status.expired);
    assert_eq!(status.remaining.unit, TrialUnit::Minutes);
    assert!(status.remaining.value >= 4 && status.remaining.value <= 5);
}

#[test]
fn trial_survives_restart() {
    let dir = TempDir::new().unwrap();
    let first = manager(config(Edition::Trial, None), &dir, 1).validate();
    let second = manager(config(Edition::Trial, None), &dir, 1).validate();

    assert!(second.valid);
    assert_eq!(
        first.trial_status.unwrap().start_time,
        second.trial_status.unwrap().start_time
    );
}

#[test]
fn release_activation_flow() {
    let dir = TempDir::new().unwrap();
    let cfg = config(Edition::Release, Some("ABCD-1234-EF56-7890"));

    let mgr = manager(cfg.clone(), &dir, 1);
    assert_eq!(mgr.validate().needs_activation, Some(true));
    assert!(mgr.activate("abcd1234ef567890").success);
    assert!(mgr.activate("ABCD-1234-EF56-7890").success);
    assert!(mgr.validate().valid);

    let other = manager(cfg, &dir, 2);
    let result = other.validate();
    assert!(!result.valid);
    assert_eq!(result.device_match, Some(false));
    assert!(!other.activate("ABCD-1234-EF56-7890").success);
}

#[test]
fn tampered_file_reads_as_unlicensed() {
    let dir = TempDir::new().unwrap();
    let cfg = config(Edition::Release, Some("ABCD-1234-EF56-7890"));
    let mgr = manager(cfg, &dir, 1);
    assert!(mgr.activate("ABCD-1234-EF56-7890").success);

    let path = mgr.store().path();
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;
    fs::write(&path, &bytes).unwrap();

    let result = mgr.validate();
    assert!(!result.valid);
    assert_eq!(result.needs_activation, Some(true));
}

#[test]
fn device_code_is_display_formatted() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(config(Edition::Release, None), &dir, 3);
    let code = mgr.device_code();

    assert_eq!(code, format_code(&code));
    assert_eq!(code.split('-').count(), 4);
    assert_eq!(code, manager(config(Edition::Release, None), &dir, 3).device_code());
}

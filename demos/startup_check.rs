//! Startup license check for a kiosk application.
//!
//! Runs the once-per-startup decision and, when a release build needs
//! activation, submits the code given on the command line.
//!
//! # Running
//!
//! ```bash
//! KIOSK_EDITION=release KIOSK_ACTIVATION_CODE=ABCD-1234-EF56-7890 \
//!     cargo run --example startup_check -- abcd-1234-ef56-7890
//! ```
//!
//! # Note
//!
//! The `KIOSK_*` variables are captured when the crate is compiled, so a
//! shipped binary cannot be reconfigured by setting them at runtime.

use kiosk_license::{LicenseConfig, LicenseManager};

fn main() {
    // Build-time edition, trial window and activation code
    let config = match LicenseConfig::from_build_env() {
        Ok(config) => LicenseConfig {
            app_identity: "startup-check-demo".to_string(),
            store_namespace: "startup-check-demo".to_string(),
            ..config
        },
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let manager = match LicenseManager::new(config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Edition: {}", manager.config().edition);
    println!("Device code: {}", manager.device_code());

    let result = manager.validate();
    if result.valid {
        println!("✓ Licensed");
        if let Some(trial) = &result.trial_status {
            println!(
                "  Trial remaining: {} {}",
                trial.remaining.value, trial.remaining.unit
            );
        }
        return;
    }

    println!(
        "✗ Not licensed: {}",
        result.error.as_deref().unwrap_or("unknown")
    );

    if result.needs_activation != Some(true) {
        std::process::exit(2);
    }

    let Some(code) = std::env::args().nth(1) else {
        eprintln!("Activation required; pass the activation code as the first argument");
        std::process::exit(2);
    };

    let outcome = manager.activate(&code);
    if outcome.success {
        println!("✓ Activated; licensed: {}", manager.validate().valid);
    } else {
        eprintln!(
            "Activation failed: {}",
            outcome.error.as_deref().unwrap_or("unknown")
        );
        std::process::exit(3);
    }
}

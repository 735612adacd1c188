//! Encrypted, tamper-evident license storage.

pub mod file;
pub mod record;

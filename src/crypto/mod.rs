//! Cryptographic primitives for the license file.

pub mod envelope;
pub mod keys;

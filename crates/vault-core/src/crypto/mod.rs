//! Cryptographic primitives for master-key handling
//!
//! This module provides:
//! - Argon2id hashing and constant-time verification of master keys
//! - Random password generation
//! - Secure memory handling with zeroize

mod generator;
mod master_key;
mod secure_memory;

pub use generator::{generate_password, DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH};
pub use master_key::{hash_master_key, verify_master_key, HashParams};
pub use secure_memory::SecretString;

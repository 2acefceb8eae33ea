//! Master-key hashing and verification using Argon2id

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Parameters for Argon2id master-key hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashParams {
    /// Memory cost in KiB (default: 65536 = 64MB)
    pub memory_cost: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl HashParams {
    /// Cheap parameters for tests
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Hash a master key into a PHC string with a fresh random salt
pub fn hash_master_key(master_key: &str, params: &HashParams) -> Result<String> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        None,
    )
    .map_err(|e| VaultError::CryptoError(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(master_key.as_bytes(), &salt)
        .map_err(|e| VaultError::CryptoError(e.to_string()))?;

    Ok(hash.to_string())
}

/// Check a master key against a stored PHC hash.
///
/// The parameters embedded in the hash are used and the digest comparison
/// is constant time. A malformed hash never verifies.
pub fn verify_master_key(master_key: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(master_key.as_bytes(), &parsed)
        .is_ok()
}

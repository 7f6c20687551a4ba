//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. Derivation is
//! deliberately slow so that unlocking the vault dominates any brute-force
//! attempt.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::keys::{Salt, VaultKey, KEY_LENGTH};
use keyhaven_common::{Error, Result};

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Parameters suitable for interactive unlock.
    ///
    /// Targets roughly half a second of derivation time on desktop
    /// hardware.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Lighter parameters for constrained devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Higher-security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive the vault key from a master password and salt using Argon2id.
///
/// # Preconditions
/// - `password` must not be empty
/// - `params` must be valid Argon2id parameters
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - `Validation` if the password is empty
/// - `Crypto` if the Argon2id parameters are rejected
///
/// # Security
/// - The password is not stored or logged
/// - The returned key zeroizes on drop
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<VaultKey> {
    if password.is_empty() {
        return Err(Error::Validation(
            "master password cannot be empty".to_string(),
        ));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("key derivation failed: {}", e)))?;

    Ok(VaultKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let salt = Salt::from_bytes([42u8; 32]);
        let params = KdfParams::moderate();

        let key1 = derive_key(b"correct horse battery", &salt, &params).unwrap();
        let key2 = derive_key(b"correct horse battery", &salt, &params).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_salt_sensitive() {
        let params = KdfParams::moderate();

        let key1 = derive_key(b"same password", &Salt::from_bytes([1u8; 32]), &params).unwrap();
        let key2 = derive_key(b"same password", &Salt::from_bytes([2u8; 32]), &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_password_sensitive() {
        let salt = Salt::from_bytes([42u8; 32]);
        let params = KdfParams::moderate();

        let key1 = derive_key(b"password one", &salt, &params).unwrap();
        let key2 = derive_key(b"password two", &salt, &params).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_empty_password_fails() {
        let salt = Salt::generate();
        let params = KdfParams::moderate();

        assert!(matches!(
            derive_key(b"", &salt, &params),
            Err(Error::Validation(_))
        ));
    }
}

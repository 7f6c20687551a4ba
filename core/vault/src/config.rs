//! Vault configuration: salt, derivation parameters, and unlock verifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use keyhaven_common::{Error, Result};
use keyhaven_crypto::{derive_key, open, seal, KdfParams, Salt, VaultKey};

/// Vault format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current vault format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Known plaintext sealed under the vault key at setup time. A later
/// unlock attempt is valid iff re-deriving the key opens the verifier back
/// to this tag.
const VERIFIER_TAG: &[u8] = b"KEYHAVEN_UNLOCK_VERIFIER_V1";

/// Persisted vault configuration.
///
/// Holds everything needed to validate an unlock attempt without storing
/// the key itself. Created once by setup; replaced only by
/// master-password rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault format version.
    pub version: VaultVersion,
    /// Salt for vault key derivation.
    pub salt: Salt,
    /// KDF cost parameters.
    pub kdf_params: KdfParams,
    /// Sealed verifier tag; never the key.
    pub verifier: Vec<u8>,
    /// Vault creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl VaultConfig {
    /// Create a fresh configuration from a master password.
    ///
    /// Generates a random salt, derives the vault key, and seals the
    /// verifier tag under it. Returns the derived key alongside the
    /// configuration so rotation can re-seal entries without deriving
    /// twice.
    ///
    /// # Errors
    /// - `Validation` if the password is empty
    /// - `Crypto` on derivation failure
    pub fn create(master_password: &[u8], kdf_params: KdfParams) -> Result<(Self, VaultKey)> {
        let salt = Salt::generate();
        let key = derive_key(master_password, &salt, &kdf_params)?;
        let verifier = seal(&key, VERIFIER_TAG)?;

        let config = Self {
            version: VaultVersion::CURRENT,
            salt,
            kdf_params,
            verifier,
            created_at: Utc::now(),
        };
        Ok((config, key))
    }

    /// Validate a master password and return the derived vault key.
    ///
    /// Re-derives with the stored salt and parameters, opens the verifier,
    /// and compares the tag in constant time. Any mismatch — authentication
    /// failure or tag difference — reports the same `InvalidCredentials`.
    ///
    /// # Errors
    /// - `InvalidCredentials` if the password does not match
    /// - `Validation` if the stored format version is unsupported
    pub fn unlock(&self, master_password: &[u8]) -> Result<VaultKey> {
        if !self.version.is_compatible() {
            return Err(Error::Validation(format!(
                "unsupported vault version {}.{}",
                self.version.major, self.version.minor
            )));
        }

        let key = derive_key(master_password, &self.salt, &self.kdf_params)?;

        match open(&key, &self.verifier) {
            Ok(tag) if bool::from(tag.ct_eq(VERIFIER_TAG)) => Ok(key),
            Ok(_) | Err(Error::DecryptionFailed) => Err(Error::InvalidCredentials),
            Err(e) => Err(e),
        }
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_unlock() {
        let (config, key) =
            VaultConfig::create(b"Passw0rd!", KdfParams::moderate()).unwrap();

        let unlocked = config.unlock(b"Passw0rd!").unwrap();
        assert_eq!(unlocked.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let (config, _) = VaultConfig::create(b"correct", KdfParams::moderate()).unwrap();

        assert!(matches!(
            config.unlock(b"wrong"),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_tampered_verifier_rejected() {
        let (mut config, _) = VaultConfig::create(b"secret", KdfParams::moderate()).unwrap();
        let last = config.verifier.len() - 1;
        config.verifier[last] ^= 0xFF;

        assert!(matches!(
            config.unlock(b"secret"),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let (mut config, _) = VaultConfig::create(b"secret", KdfParams::moderate()).unwrap();
        config.version = VaultVersion { major: 2, minor: 0 };

        assert!(matches!(config.unlock(b"secret"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let (config, _) = VaultConfig::create(b"secret", KdfParams::moderate()).unwrap();

        let bytes = config.to_bytes().unwrap();
        let restored = VaultConfig::from_bytes(&bytes).unwrap();

        assert_eq!(restored.salt, config.salt);
        assert_eq!(restored.kdf_params, config.kdf_params);
        assert_eq!(restored.verifier, config.verifier);
        assert!(restored.unlock(b"secret").is_ok());
    }
}

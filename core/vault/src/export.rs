//! Encrypted vault backup files.
//!
//! An export bundles the vault configuration and the raw entry rows
//! (ciphertext included) into one JSON payload, sealed under a key derived
//! from a standalone passphrase. Restoring into an empty vault reproduces
//! the original contents; the original master password still unlocks it,
//! because the configuration travels with the rows it matches.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use keyhaven_common::{Error, Result};
use keyhaven_crypto::{derive_key, open, seal, KdfParams, Salt};
use keyhaven_storage::EntryRecord;

/// Current export file format version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ExportPayload {
    config: VaultConfig,
    records: Vec<EntryRecord>,
}

/// On-disk shape of an encrypted backup.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportFile {
    pub version: u32,
    pub kdf_params: KdfParams,
    pub salt: Salt,
    pub ciphertext: String,
}

/// Serialize and seal a backup under a passphrase.
///
/// # Errors
/// - `Validation` if the passphrase is empty
pub fn export_encrypted(
    config: &VaultConfig,
    records: &[EntryRecord],
    passphrase: &str,
) -> Result<String> {
    let payload = ExportPayload {
        config: config.clone(),
        records: records.to_vec(),
    };
    let encoded =
        serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?;

    let kdf_params = KdfParams::interactive();
    let salt = Salt::generate();
    let key = derive_key(passphrase.as_bytes(), &salt, &kdf_params)?;
    let sealed = seal(&key, &encoded)?;

    let file = ExportFile {
        version: EXPORT_VERSION,
        kdf_params,
        salt,
        ciphertext: STANDARD.encode(sealed),
    };
    serde_json::to_string(&file).map_err(|e| Error::Serialization(e.to_string()))
}

/// Open a backup file and return its contents.
///
/// # Errors
/// - `Validation` on an unsupported format version
/// - `DecryptionFailed` on a wrong passphrase or tampered file
pub fn import_encrypted(data: &str, passphrase: &str) -> Result<(VaultConfig, Vec<EntryRecord>)> {
    let file: ExportFile =
        serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))?;

    if file.version != EXPORT_VERSION {
        return Err(Error::Validation(format!(
            "unsupported export version {}",
            file.version
        )));
    }

    let sealed = STANDARD
        .decode(&file.ciphertext)
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let key = derive_key(passphrase.as_bytes(), &file.salt, &file.kdf_params)?;
    let encoded = open(&key, &sealed)?;

    let payload: ExportPayload =
        serde_json::from_slice(&encoded).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok((payload.config, payload.records))
}

//! Entry storage with sealed secret fields.
//!
//! The store owns validation, timestamp assignment, and the sealing and
//! opening of secret fields. Decrypted plaintext is returned to the caller
//! and never written back or cached; rows in the backend only ever hold
//! ciphertext.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::entry::{EntryDraft, EntryMeta, EntryPatch, EntryRevealed};
use keyhaven_common::{Error, Patch, Result};
use keyhaven_crypto::{open, open_codes, seal, seal_codes, VaultKey};
use keyhaven_storage::{EntryRecord, StorageBackend};

/// Credential entry store.
pub struct EntryStore {
    backend: Arc<dyn StorageBackend>,
    /// Last issued timestamp; keeps `updated_at` strictly increasing even
    /// when two mutations land in the same clock microsecond.
    clock: AtomicI64,
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn open_password(key: &VaultKey, sealed: &[u8]) -> Result<String> {
    let plaintext = open(key, sealed)?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::Serialization("stored password is not valid UTF-8".to_string()))
}

impl EntryStore {
    /// Create a store over a backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            clock: AtomicI64::new(0),
        }
    }

    /// Mutations are serialized by the caller, so a load/store pair is
    /// enough to keep issued timestamps strictly increasing.
    fn next_timestamp(&self) -> i64 {
        let last = self.clock.load(Ordering::Acquire);
        let ts = now_micros().max(last + 1);
        self.clock.store(ts, Ordering::Release);
        ts
    }

    /// Create a new entry, sealing any secret fields present in the draft.
    ///
    /// # Errors
    /// - `Validation` if the title is empty after trimming
    pub async fn create(&self, draft: &EntryDraft, key: &VaultKey) -> Result<EntryRecord> {
        let title = validate_title(&draft.title)?;

        let password_ct = draft
            .password
            .as_deref()
            .map(|p| seal(key, p.as_bytes()))
            .transpose()?;
        let recovery_codes_ct = draft
            .recovery_codes
            .as_deref()
            .map(|codes| seal_codes(key, codes))
            .transpose()?;

        let now = self.next_timestamp();
        let record = EntryRecord {
            id: keyhaven_common::EntryId::generate().as_str().to_string(),
            title,
            username: draft.username.clone(),
            url: draft.url.clone(),
            notes: draft.notes.clone(),
            password_ct,
            recovery_codes_ct,
            created_at: now,
            updated_at: now,
            last_rotated_at: None,
        };

        self.backend.insert_entry(&record).await?;
        info!(id = %record.id, "entry created");
        Ok(record)
    }

    /// Fetch the raw row for an entry.
    ///
    /// # Errors
    /// - `NotFound` if the id is absent
    pub async fn get_record(&self, id: &str) -> Result<EntryRecord> {
        self.backend
            .get_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("entry {}", id)))
    }

    /// Metadata view of an entry. No key required.
    pub async fn get(&self, id: &str) -> Result<EntryMeta> {
        EntryMeta::from_record(&self.get_record(id).await?)
    }

    /// Revealed view of an entry: secret fields are decrypted on the fly.
    ///
    /// # Errors
    /// - `NotFound` if the id is absent
    /// - `DecryptionFailed` if a sealed field fails authentication
    pub async fn reveal(&self, id: &str, key: &VaultKey) -> Result<EntryRevealed> {
        let record = self.get_record(id).await?;

        let password = record
            .password_ct
            .as_deref()
            .map(|ct| open_password(key, ct))
            .transpose()?;
        let recovery_codes = record
            .recovery_codes_ct
            .as_deref()
            .map(|ct| open_codes(key, ct))
            .transpose()?;

        info!(id = %record.id, "secret fields revealed");
        Ok(EntryRevealed {
            meta: EntryMeta::from_record(&record)?,
            password,
            recovery_codes,
        })
    }

    /// Apply a partial update, re-sealing changed secret fields with fresh
    /// nonces.
    ///
    /// `updated_at` strictly increases on every call; `last_rotated_at`
    /// moves only when the password field changed.
    ///
    /// # Errors
    /// - `NotFound` if the id is absent
    /// - `Validation` on an empty or cleared title
    pub async fn update(&self, id: &str, patch: &EntryPatch, key: &VaultKey) -> Result<EntryRecord> {
        let mut record = self.get_record(id).await?;

        record.title = match patch.title.as_ref() {
            Patch::Keep => record.title,
            Patch::Clear => {
                return Err(Error::Validation("title cannot be cleared".to_string()))
            }
            Patch::Set(title) => validate_title(title)?,
        };
        record.username = patch.username.clone().resolve(record.username);
        record.url = patch.url.clone().resolve(record.url);
        record.notes = patch.notes.clone().resolve(record.notes);

        let password_changed = match patch.password.as_ref() {
            Patch::Keep => false,
            Patch::Clear => record.password_ct.is_some(),
            Patch::Set(_) => true,
        };
        record.password_ct = match patch.password.as_ref() {
            Patch::Keep => record.password_ct,
            Patch::Clear => None,
            Patch::Set(password) => Some(seal(key, password.as_bytes())?),
        };
        record.recovery_codes_ct = match patch.recovery_codes.as_ref() {
            Patch::Keep => record.recovery_codes_ct,
            Patch::Clear => None,
            Patch::Set(codes) => Some(seal_codes(key, codes)?),
        };

        // Bump past the stored value even if the clock has not advanced.
        let now = self.next_timestamp().max(record.updated_at + 1);
        record.updated_at = now;
        if password_changed {
            record.last_rotated_at = Some(now);
        }

        if !self.backend.update_entry(&record).await? {
            return Err(Error::NotFound(format!("entry {}", id)));
        }
        info!(id = %record.id, rotated = password_changed, "entry updated");
        Ok(record)
    }

    /// Delete an entry irreversibly.
    ///
    /// # Errors
    /// - `NotFound` if the id is absent; callers must not retry silently
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.backend.delete_entry(id).await? {
            return Err(Error::NotFound(format!("entry {}", id)));
        }
        info!(id = %id, "entry deleted");
        Ok(())
    }

    /// Metadata for every entry, ordered by `updated_at` descending.
    pub async fn list(&self) -> Result<Vec<EntryMeta>> {
        self.backend
            .list_entries()
            .await?
            .iter()
            .map(EntryMeta::from_record)
            .collect()
    }

    /// All raw rows, for index rebuilds and export.
    pub async fn records(&self) -> Result<Vec<EntryRecord>> {
        self.backend.list_entries().await
    }

    /// Re-seal every secret field under a new key.
    ///
    /// Used by master-password rotation. Returns the rewritten rows; the
    /// caller persists them together with the new configuration in one
    /// transaction.
    ///
    /// # Errors
    /// - `DecryptionFailed` if any field fails to open under the old key
    pub async fn rewrap(&self, old_key: &VaultKey, new_key: &VaultKey) -> Result<Vec<EntryRecord>> {
        let mut records = self.backend.list_entries().await?;

        for record in &mut records {
            if let Some(ct) = record.password_ct.take() {
                let plaintext = open(old_key, &ct)?;
                record.password_ct = Some(seal(new_key, &plaintext)?);
            }
            if let Some(ct) = record.recovery_codes_ct.take() {
                let plaintext = open(old_key, &ct)?;
                record.recovery_codes_ct = Some(seal(new_key, &plaintext)?);
            }
        }

        info!(rows = records.len(), "entries re-sealed under new key");
        Ok(records)
    }
}

//! Vault service facade.
//!
//! The typed boundary consumed by transport layers: one method per vault
//! operation, with the session state machine deciding which of them may
//! touch secrets. Shared by concurrent callers behind an `Arc`; all
//! mutations serialize on a single writer lock so timestamps and index
//! state cannot interleave.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::VaultConfig;
use crate::entry::{EntryDraft, EntryMeta, EntryPatch, EntryRevealed};
use crate::export::{export_encrypted, import_encrypted};
use crate::index::SearchIndex;
use crate::session::{SessionManager, SessionState};
use crate::store::EntryStore;
use keyhaven_common::{Error, Result};
use keyhaven_crypto::{generate, GenerationRequest, KdfParams};
use keyhaven_storage::StorageBackend;

/// Tunables for opening a vault.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    /// Lock the session after this much inactivity. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// KDF cost used when setup creates a new configuration.
    pub kdf_params: KdfParams,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            kdf_params: KdfParams::interactive(),
        }
    }
}

/// Snapshot of the vault lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStatus {
    pub initialized: bool,
    pub unlocked: bool,
}

/// Credential vault service.
pub struct Vault {
    backend: Arc<dyn StorageBackend>,
    store: EntryStore,
    session: SessionManager,
    config: RwLock<Option<VaultConfig>>,
    index: std::sync::RwLock<SearchIndex>,
    writer: Mutex<()>,
    kdf_params: KdfParams,
}

impl Vault {
    /// Open a vault over a backend, loading any stored configuration and
    /// building the search index from the entry metadata.
    pub async fn open(backend: Arc<dyn StorageBackend>, options: VaultOptions) -> Result<Self> {
        let config = match backend.load_config().await? {
            Some(bytes) => Some(VaultConfig::from_bytes(&bytes)?),
            None => None,
        };

        let records = backend.list_entries().await?;
        let index = SearchIndex::build(&records);
        info!(
            backend = backend.name(),
            entries = records.len(),
            initialized = config.is_some(),
            "vault opened"
        );

        Ok(Self {
            store: EntryStore::new(backend.clone()),
            session: SessionManager::new(config.is_some(), options.idle_timeout),
            config: RwLock::new(config),
            index: std::sync::RwLock::new(index),
            writer: Mutex::new(()),
            kdf_params: options.kdf_params,
            backend,
        })
    }

    /// Lifecycle snapshot.
    pub async fn status(&self) -> VaultStatus {
        VaultStatus {
            initialized: self.config.read().await.is_some(),
            unlocked: self.session.state().await == SessionState::Unlocked,
        }
    }

    /// First-time initialization: derive the vault key, persist the
    /// configuration, and leave the vault locked.
    ///
    /// # Errors
    /// - `AlreadyInitialized` if a configuration exists
    /// - `Validation` if the master password is empty
    pub async fn setup(&self, master_password: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut config = self.config.write().await;
        if config.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let (new_config, _key) =
            VaultConfig::create(master_password.as_bytes(), self.kdf_params.clone())?;
        self.backend.save_config(new_config.to_bytes()?).await?;
        *config = Some(new_config);
        self.session.mark_initialized().await;

        info!("vault initialized");
        Ok(())
    }

    /// Unlock the session with the master password.
    ///
    /// # Errors
    /// - `Validation` if the vault is uninitialized
    /// - `InvalidCredentials` on mismatch
    pub async fn unlock(&self, master_password: &str) -> Result<()> {
        let config = self.config.read().await;
        let config = config.as_ref().ok_or_else(|| {
            Error::Validation("vault is not initialized; run setup first".to_string())
        })?;
        self.session
            .unlock_with(config, master_password.as_bytes())
            .await
    }

    /// Lock the session, dropping the key.
    pub async fn lock(&self) {
        self.session.lock().await;
    }

    /// List entry metadata.
    ///
    /// Without a query, entries come back ordered by `updated_at`
    /// descending. With a query, order is relevance then recency, per the
    /// search index. Works while locked; secrets are not involved.
    pub async fn list(&self, query: Option<&str>) -> Result<Vec<EntryMeta>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        match query {
            None => self.store.list().await,
            Some(q) => {
                let ids = self.index.read().unwrap().search(q);
                let mut items = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.store.get(&id).await {
                        Ok(meta) => items.push(meta),
                        // The index is advisory; a row deleted between the
                        // search and the fetch is simply not a hit.
                        Err(Error::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(items)
            }
        }
    }

    /// Metadata view of one entry. Works while locked.
    pub async fn get(&self, id: &str) -> Result<EntryMeta> {
        self.store.get(id).await
    }

    /// Revealed view of one entry.
    ///
    /// # Errors
    /// - `LockedVault` unless the session is unlocked
    pub async fn reveal(&self, id: &str) -> Result<EntryRevealed> {
        let key = self.session.key().await?;
        self.store.reveal(id, &key).await
    }

    /// Create an entry, returning its metadata view.
    ///
    /// # Errors
    /// - `LockedVault` unless the session is unlocked (secret fields must
    ///   be sealed under the vault key)
    /// - `Validation` on an empty title
    pub async fn create(&self, draft: EntryDraft) -> Result<EntryMeta> {
        let key = self.session.key().await?;
        let _guard = self.writer.lock().await;

        let record = self.store.create(&draft, &key).await?;
        self.index.write().unwrap().upsert(&record);
        EntryMeta::from_record(&record)
    }

    /// Create an entry and echo the secret fields back in the response.
    pub async fn create_revealed(&self, draft: EntryDraft) -> Result<EntryRevealed> {
        let password = draft.password.clone();
        let recovery_codes = draft.recovery_codes.clone();
        let meta = self.create(draft).await?;
        Ok(EntryRevealed {
            meta,
            password,
            recovery_codes,
        })
    }

    /// Apply a partial update, returning the new metadata view.
    ///
    /// # Errors
    /// - `LockedVault` unless the session is unlocked
    /// - `NotFound` / `Validation` per the store contract
    pub async fn update(&self, id: &str, patch: EntryPatch) -> Result<EntryMeta> {
        let key = self.session.key().await?;
        let _guard = self.writer.lock().await;

        let record = self.store.update(id, &patch, &key).await?;
        self.index.write().unwrap().upsert(&record);
        EntryMeta::from_record(&record)
    }

    /// Apply a partial update and return the revealed view.
    pub async fn update_revealed(&self, id: &str, patch: EntryPatch) -> Result<EntryRevealed> {
        self.update(id, patch).await?;
        self.reveal(id).await
    }

    /// Delete an entry. Works while locked; no secret is touched.
    ///
    /// # Errors
    /// - `NotFound` if the id is absent
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.store.delete(id).await?;
        self.index.write().unwrap().remove(id);
        Ok(())
    }

    /// Generate a password. Bypasses storage and session entirely.
    pub fn generate(&self, request: &GenerationRequest) -> Result<String> {
        generate(request)
    }

    /// Rotate the master password: verify the old one, derive a fresh
    /// salt and key, re-seal every secret field, and swap configuration
    /// and rows in one transaction. An unlocked session stays unlocked
    /// with the new key.
    ///
    /// # Errors
    /// - `InvalidCredentials` if the old password is wrong
    /// - `Validation` if the vault is uninitialized
    pub async fn change_master_password(&self, old: &str, new: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut config = self.config.write().await;
        let current = config.as_ref().ok_or_else(|| {
            Error::Validation("vault is not initialized; run setup first".to_string())
        })?;

        let old_key = current.unlock(old.as_bytes())?;
        let (new_config, new_key) =
            VaultConfig::create(new.as_bytes(), current.kdf_params.clone())?;

        let records = self.store.rewrap(&old_key, &new_key).await?;
        self.backend
            .replace_all(new_config.to_bytes()?, records)
            .await?;

        *config = Some(new_config);
        self.session.install_key(new_key).await;

        info!("master password rotated");
        Ok(())
    }

    /// Produce an encrypted backup of the whole vault under a standalone
    /// passphrase. Rows leave as ciphertext; nothing is revealed.
    ///
    /// # Errors
    /// - `Validation` if the vault is uninitialized or the passphrase is
    ///   empty
    pub async fn export(&self, passphrase: &str) -> Result<String> {
        let config = self.config.read().await;
        let config = config.as_ref().ok_or_else(|| {
            Error::Validation("vault is not initialized; nothing to export".to_string())
        })?;

        let records = self.store.records().await?;
        info!(entries = records.len(), "exporting encrypted backup");
        export_encrypted(config, &records, passphrase)
    }

    /// Restore a backup into an uninitialized vault.
    ///
    /// Returns the number of restored entries. The restored vault unlocks
    /// with the master password it was exported under.
    ///
    /// # Errors
    /// - `AlreadyInitialized` if this vault has a configuration
    /// - `DecryptionFailed` on a wrong passphrase or tampered file
    pub async fn import(&self, data: &str, passphrase: &str) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let mut config = self.config.write().await;
        if config.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let (restored_config, records) = import_encrypted(data, passphrase)?;
        let count = records.len();

        self.backend
            .replace_all(restored_config.to_bytes()?, records.clone())
            .await?;
        *self.index.write().unwrap() = SearchIndex::build(&records);
        *config = Some(restored_config);
        self.session.mark_initialized().await;

        info!(entries = count, "backup imported");
        Ok(count)
    }
}

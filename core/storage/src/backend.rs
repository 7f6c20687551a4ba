//! Storage backend trait and the persisted entry row shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use keyhaven_common::Result;

/// Persisted form of a vault entry.
///
/// Metadata columns are plaintext; `password_ct` and `recovery_codes_ct`
/// hold sealed blobs and are opaque to the backend. Timestamps are unix
/// microseconds so ordering and monotonicity checks are integer
/// comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: String,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub password_ct: Option<Vec<u8>>,
    pub recovery_codes_ct: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_rotated_at: Option<i64>,
}

/// Persistence seam for the vault.
///
/// The vault configuration is stored as an opaque blob; its schema belongs
/// to the vault crate. Entry listings come back ordered by `updated_at`
/// descending.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Load the vault configuration blob, if one has been stored.
    async fn load_config(&self) -> Result<Option<Vec<u8>>>;

    /// Store the vault configuration blob, replacing any previous one.
    async fn save_config(&self, config: Vec<u8>) -> Result<()>;

    /// Insert a new entry row.
    async fn insert_entry(&self, record: &EntryRecord) -> Result<()>;

    /// Fetch a single entry row by id.
    async fn get_entry(&self, id: &str) -> Result<Option<EntryRecord>>;

    /// Overwrite an existing entry row. Returns false if the id is absent.
    async fn update_entry(&self, record: &EntryRecord) -> Result<bool>;

    /// Remove an entry row. Returns false if the id is absent.
    async fn delete_entry(&self, id: &str) -> Result<bool>;

    /// All entry rows, ordered by `updated_at` descending.
    async fn list_entries(&self) -> Result<Vec<EntryRecord>>;

    /// Atomically replace the configuration and every entry row.
    ///
    /// Used by master-password rotation and restore, where a partially
    /// applied swap would leave rows sealed under a key the stored
    /// configuration no longer describes.
    async fn replace_all(&self, config: Vec<u8>, records: Vec<EntryRecord>) -> Result<()>;
}

//! In-memory storage backend for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::backend::{EntryRecord, StorageBackend};
use keyhaven_common::Result;

#[derive(Default)]
struct Inner {
    config: Option<Vec<u8>>,
    entries: HashMap<String, EntryRecord>,
}

/// In-memory storage backend.
///
/// Useful for testing and development. All data is lost on drop.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_config(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().unwrap().config.clone())
    }

    async fn save_config(&self, config: Vec<u8>) -> Result<()> {
        self.inner.write().unwrap().config = Some(config);
        Ok(())
    }

    async fn insert_entry(&self, record: &EntryRecord) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .entries
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> Result<Option<EntryRecord>> {
        Ok(self.inner.read().unwrap().entries.get(id).cloned())
    }

    async fn update_entry(&self, record: &EntryRecord) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.entries.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        Ok(self.inner.write().unwrap().entries.remove(id).is_some())
    }

    async fn list_entries(&self) -> Result<Vec<EntryRecord>> {
        let inner = self.inner.read().unwrap();
        let mut records: Vec<EntryRecord> = inner.entries.values().cloned().collect();
        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn replace_all(&self, config: Vec<u8>, records: Vec<EntryRecord>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.config = Some(config);
        inner.entries = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(())
    }
}

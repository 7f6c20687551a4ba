//! Entry result and input shapes.
//!
//! Secret disclosure is modeled as two distinct result types rather than
//! conditionally nulled fields: [`EntryMeta`] carries metadata only and can
//! be produced from a locked vault; [`EntryRevealed`] additionally carries
//! decrypted secrets and is only constructible through an unlocked session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyhaven_common::{EntryId, Error, Patch, Result};
use keyhaven_storage::EntryRecord;

/// Metadata view of an entry. Secret fields are represented only by
/// presence flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub id: EntryId,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub has_password: bool,
    pub has_recovery_codes: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_rotated_at: Option<DateTime<Utc>>,
}

/// Revealed view of an entry: metadata plus decrypted secret fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRevealed {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub password: Option<String>,
    pub recovery_codes: Option<Vec<String>>,
}

/// Payload for creating an entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryDraft {
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub recovery_codes: Option<Vec<String>>,
}

/// Partial update payload.
///
/// Every field is three-state: omitted keeps the stored value, `null`
/// clears it, a value replaces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub username: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub url: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub notes: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub password: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub recovery_codes: Patch<Vec<String>>,
}

pub(crate) fn ts_from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {}", micros)))
}

impl EntryMeta {
    /// Build the metadata view of a stored row.
    pub fn from_record(record: &EntryRecord) -> Result<Self> {
        Ok(Self {
            id: EntryId::new(record.id.clone())?,
            title: record.title.clone(),
            username: record.username.clone(),
            url: record.url.clone(),
            notes: record.notes.clone(),
            has_password: record.password_ct.is_some(),
            has_recovery_codes: record.recovery_codes_ct.is_some(),
            created_at: ts_from_micros(record.created_at)?,
            updated_at: ts_from_micros(record.updated_at)?,
            last_rotated_at: record.last_rotated_at.map(ts_from_micros).transpose()?,
        })
    }
}

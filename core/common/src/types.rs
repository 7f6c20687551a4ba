//! Common types used throughout keyhaven.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unique identifier for a vault entry.
///
/// Opaque and stable for the lifetime of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Create an EntryId from an existing string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::Validation(
                "EntryId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three-state value for partial updates.
///
/// Distinguishes a field that was omitted from the payload (`Keep`) from a
/// field explicitly set to null (`Clear`). In JSON: a missing key
/// deserializes to `Keep` (via `#[serde(default)]`), `null` to `Clear`,
/// and a value to `Set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// Field was not present in the payload; leave the stored value alone.
    #[default]
    Keep,
    /// Field was explicitly null; clear the stored value.
    Clear,
    /// Field carries a replacement value.
    Set(T),
}

impl<T> Patch<T> {
    /// True if this patch leaves the field unchanged.
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// True if this patch carries a replacement value.
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    /// Apply the patch to the current value of the field.
    pub fn resolve(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(value) => Some(value),
        }
    }

    /// Borrowing view of the patch.
    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(value),
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(value) => serializer.serialize_some(value),
            // Keep is skipped at the field level; a surviving Keep
            // serializes the same as Clear.
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|opt| match opt {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_entry_id_generate_unique() {
        let a = EntryId::generate();
        let b = EntryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_entry_id_empty_fails() {
        assert!(EntryId::new("").is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default)]
        url: Patch<String>,
    }

    #[test]
    fn test_patch_omitted_is_keep() {
        let p: Payload = serde_json::from_str("{}").unwrap();
        assert_eq!(p.url, Patch::Keep);
    }

    #[test]
    fn test_patch_null_is_clear() {
        let p: Payload = serde_json::from_str(r#"{"url": null}"#).unwrap();
        assert_eq!(p.url, Patch::Clear);
    }

    #[test]
    fn test_patch_value_is_set() {
        let p: Payload = serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(p.url, Patch::Set("https://example.com".to_string()));
    }

    #[test]
    fn test_patch_resolve() {
        let current = Some("old".to_string());
        assert_eq!(Patch::Keep.resolve(current.clone()), current);
        assert_eq!(Patch::<String>::Clear.resolve(current.clone()), None);
        assert_eq!(
            Patch::Set("new".to_string()).resolve(current),
            Some("new".to_string())
        );
    }
}

//! Metadata search index.
//!
//! Case-insensitive substring matching over `title`, `username`, and
//! `url`. Secret fields are never indexed, so no plaintext is ever
//! materialized for search. The index is rebuilt from the backend on open
//! and maintained incrementally on every mutation.

use std::collections::HashMap;

use keyhaven_storage::EntryRecord;

#[derive(Debug, Clone)]
struct Doc {
    title: String,
    username: String,
    url: String,
    updated_at: i64,
}

/// Field weight, match position, recency — lower sorts first for the
/// first two, newer first for the third.
type Rank = (usize, usize, i64);

/// In-memory metadata index over vault entries.
#[derive(Debug, Default)]
pub struct SearchIndex {
    docs: HashMap<String, Doc>,
}

impl SearchIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over a full set of rows.
    pub fn build(records: &[EntryRecord]) -> Self {
        let mut index = Self::new();
        for record in records {
            index.upsert(record);
        }
        index
    }

    /// Insert or refresh one entry's metadata.
    pub fn upsert(&mut self, record: &EntryRecord) {
        self.docs.insert(
            record.id.clone(),
            Doc {
                title: record.title.to_lowercase(),
                username: record
                    .username
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase(),
                url: record.url.as_deref().unwrap_or_default().to_lowercase(),
                updated_at: record.updated_at,
            },
        );
    }

    /// Drop an entry from the index.
    pub fn remove(&mut self, id: &str) {
        self.docs.remove(id);
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Find entry ids matching the query.
    ///
    /// An empty (or whitespace) query returns every id ordered by recency.
    /// Otherwise results are ordered by relevance — a title match beats a
    /// username match beats a url match, earlier matches within the field
    /// rank higher — then recency.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.trim().to_lowercase();

        let mut hits: Vec<(&String, Rank)> = self
            .docs
            .iter()
            .filter_map(|(id, doc)| doc_rank(doc, &needle).map(|rank| (id, rank)))
            .collect();

        hits.sort_by(|(a_id, a), (b_id, b)| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(b.2.cmp(&a.2))
                .then(a_id.cmp(b_id))
        });

        hits.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

fn doc_rank(doc: &Doc, needle: &str) -> Option<Rank> {
    if needle.is_empty() {
        return Some((0, 0, doc.updated_at));
    }

    let fields = [&doc.title, &doc.username, &doc.url];
    fields
        .iter()
        .enumerate()
        .filter_map(|(weight, field)| field.find(needle).map(|pos| (weight, pos)))
        .next()
        .map(|(weight, pos)| (weight, pos, doc.updated_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, username: Option<&str>, url: Option<&str>, at: i64) -> EntryRecord {
        EntryRecord {
            id: id.to_string(),
            title: title.to_string(),
            username: username.map(String::from),
            url: url.map(String::from),
            notes: None,
            password_ct: None,
            recovery_codes_ct: None,
            created_at: at,
            updated_at: at,
            last_rotated_at: None,
        }
    }

    #[test]
    fn test_empty_query_returns_all_by_recency() {
        let index = SearchIndex::build(&[
            record("a", "Older", None, None, 10),
            record("b", "Newer", None, None, 20),
        ]);

        assert_eq!(index.search(""), vec!["b", "a"]);
        assert_eq!(index.search("   "), vec!["b", "a"]);
    }

    #[test]
    fn test_case_insensitive_substring() {
        let index = SearchIndex::build(&[record("a", "GitHub", Some("dev"), None, 1)]);

        assert_eq!(index.search("git"), vec!["a"]);
        assert_eq!(index.search("HUB"), vec!["a"]);
        assert!(index.search("gitlab").is_empty());
    }

    #[test]
    fn test_matches_username_and_url() {
        let index = SearchIndex::build(&[record(
            "a",
            "Work mail",
            Some("alice@example.com"),
            Some("https://mail.example.com"),
            1,
        )]);

        assert_eq!(index.search("alice").len(), 1);
        assert_eq!(index.search("mail.example").len(), 1);
    }

    #[test]
    fn test_title_match_outranks_username_match() {
        let index = SearchIndex::build(&[
            record("by-user", "Forge", Some("github-bot"), None, 100),
            record("by-title", "GitHub", Some("dev"), None, 1),
        ]);

        assert_eq!(index.search("github"), vec!["by-title", "by-user"]);
    }

    #[test]
    fn test_incremental_consistency() {
        let mut index = SearchIndex::new();
        index.upsert(&record("a", "GitHub", None, None, 1));
        assert_eq!(index.search("git"), vec!["a"]);

        index.upsert(&record("a", "Sourcehut", None, None, 2));
        assert!(index.search("git").is_empty());
        assert_eq!(index.search("sourcehut"), vec!["a"]);

        index.remove("a");
        assert!(index.search("sourcehut").is_empty());
        assert!(index.is_empty());
    }
}

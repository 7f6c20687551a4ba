//! Storage backend abstraction for keyhaven.
//!
//! This module provides a trait-based interface for entry persistence
//! (SQLite on disk, in-memory for tests). Backends store plaintext
//! metadata and opaque ciphertext blobs; they never see key material or
//! decrypted secrets.
//!
//! # Design Principles
//! - Backend isolation: no crypto or session logic in this crate
//! - Async operations: all I/O goes through an async trait
//! - Unified error semantics: failures map onto the common error type

pub mod backend;
pub mod memory;
pub mod sqlite;

pub use backend::{EntryRecord, StorageBackend};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

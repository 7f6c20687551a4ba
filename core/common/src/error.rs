//! Common error types for keyhaven.
//!
//! Every failure surfaces to the caller with a stable kind; nothing is
//! retried inside the core. Error messages must never contain secret
//! plaintext or master passwords.

use thiserror::Error;

/// Top-level error type for keyhaven operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed shape or bounds validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires an unlocked vault session.
    #[error("Vault is locked")]
    LockedVault,

    /// Master password did not match the stored verifier.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ciphertext failed authentication: wrong key, tampering, or corruption.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Setup called on an already-initialized vault.
    #[error("Vault already initialized")]
    AlreadyInitialized,

    /// Cryptographic primitive failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

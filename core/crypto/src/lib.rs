//! Cryptographic primitives for keyhaven.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Per-field authenticated encryption using XChaCha20-Poly1305
//! - Secure key management with automatic zeroization
//! - Password generation from a CSPRNG under character-class constraints
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Sealing is non-deterministic: every call draws a fresh random nonce

pub mod codec;
pub mod kdf;
pub mod keys;
pub mod password;

pub use codec::{open, open_codes, seal, seal_codes};
pub use kdf::{derive_key, KdfParams};
pub use keys::{Salt, VaultKey, KEY_LENGTH, SALT_LENGTH};
pub use password::{generate, GenerationRequest};

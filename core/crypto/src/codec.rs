//! Per-field authenticated encryption using XChaCha20-Poly1305.
//!
//! Each secret field of an entry is sealed independently: a fresh random
//! 24-byte nonce per call, ciphertext authenticated with Poly1305. Sealing
//! the same plaintext twice yields different ciphertexts.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::keys::VaultKey;
use keyhaven_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Seal a plaintext field value under the vault key.
///
/// # Postconditions
/// - Output layout is `nonce || ciphertext || tag`
/// - The nonce is drawn from the OS CSPRNG, so repeated calls on the same
///   plaintext produce different outputs
///
/// # Errors
/// - `Crypto` if the underlying cipher fails
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("sealing failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);

    Ok(sealed)
}

/// Open a sealed field value under the vault key.
///
/// Authenticates before returning; on any failure no partial plaintext is
/// produced.
///
/// # Errors
/// - `DecryptionFailed` if the ciphertext is truncated, was tampered with,
///   or was sealed under a different key
pub fn open(key: &VaultKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

/// Seal an ordered list of recovery codes as a single field.
///
/// The list is JSON-encoded before sealing so order survives the round
/// trip.
pub fn seal_codes(key: &VaultKey, codes: &[String]) -> Result<Vec<u8>> {
    let encoded =
        serde_json::to_vec(codes).map_err(|e| Error::Serialization(e.to_string()))?;
    seal(key, &encoded)
}

/// Open a sealed recovery-code list.
///
/// # Errors
/// - `DecryptionFailed` on authentication failure
/// - `Serialization` if the authenticated plaintext is not a valid list
///   (indicates a logic error, not tampering — tampering fails the tag)
pub fn open_codes(key: &VaultKey, sealed: &[u8]) -> Result<Vec<String>> {
    let plaintext = open(key, sealed)?;
    serde_json::from_slice(&plaintext).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;
    use proptest::prelude::*;

    fn key(byte: u8) -> VaultKey {
        VaultKey::from_bytes([byte; KEY_LENGTH])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let k = key(42);
        let plaintext = b"hunter2";

        let sealed = seal(&k, plaintext).unwrap();
        let opened = open(&k, &sealed).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_sealed_size() {
        let k = key(42);
        let plaintext = b"some secret";

        let sealed = seal(&k, plaintext).unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_seal_nondeterministic() {
        let k = key(42);
        let plaintext = b"same plaintext";

        let a = seal(&k, plaintext).unwrap();
        let b = seal(&k, plaintext).unwrap();

        assert_ne!(&a[..NONCE_SIZE], &b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&key(1), b"secret").unwrap();

        assert!(matches!(
            open(&key(2), &sealed),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let k = key(42);
        let mut sealed = seal(&k, b"important data").unwrap();
        sealed[NONCE_SIZE + 3] ^= 0xFF;

        assert!(matches!(open(&k, &sealed), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let k = key(42);
        let sealed = seal(&k, b"data").unwrap();

        assert!(matches!(
            open(&k, &sealed[..NONCE_SIZE + TAG_SIZE - 1]),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(42);

        let sealed = seal(&k, b"").unwrap();
        assert_eq!(open(&k, &sealed).unwrap(), b"");
    }

    #[test]
    fn test_codes_preserve_order() {
        let k = key(9);
        let codes = vec![
            "1111-2222".to_string(),
            "3333-4444".to_string(),
            "5555-6666".to_string(),
        ];

        let sealed = seal_codes(&k, &codes).unwrap();
        let opened = open_codes(&k, &sealed).unwrap();

        assert_eq!(opened, codes);
    }

    #[test]
    fn test_empty_codes_list() {
        let k = key(9);

        let sealed = seal_codes(&k, &[]).unwrap();
        assert!(open_codes(&k, &sealed).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let k = key(42);
            let sealed = seal(&k, &plaintext).unwrap();
            prop_assert_eq!(open(&k, &sealed).unwrap(), plaintext);
        }

        #[test]
        fn prop_bit_flip_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 1..128),
            flip in any::<usize>(),
        ) {
            let k = key(42);
            let mut sealed = seal(&k, &plaintext).unwrap();
            let idx = flip % sealed.len();
            sealed[idx] ^= 0x01;
            prop_assert!(open(&k, &sealed).is_err());
        }
    }
}

//! AES Key Wrap (RFC 3394) for JWE content encryption keys.
//!
//! Unwrapping reports every failure as [`JweError::CannotDecrypt`].

use aes_kw::KekAes256;
use zeroize::Zeroizing;

use super::error::{JweError, Result};

/// A content encryption key, zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEncryptionKey(Zeroizing<Vec<u8>>);

impl ContentEncryptionKey {
    /// Creates a new content encryption key.
    pub fn new(key: Zeroizing<Vec<u8>>) -> Self {
        Self(key)
    }

    /// Gets the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn kek_from_slice(kek: &[u8]) -> Option<KekAes256> {
    let bytes: [u8; 32] = kek.try_into().ok()?;
    Some(KekAes256::from(bytes))
}

/// Wraps `key` under `kek`.
///
/// # Errors
///
/// Returns `InvalidInput` if `key` is shorter than 16 bytes or not a multiple
/// of 8 bytes, or if `kek` is not an AES-256 key.
pub fn wrap_key(kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() % 8 != 0 || key.len() < 16 {
        return Err(JweError::InvalidInput(format!(
            "key to wrap must be a multiple of 8 bytes and at least 16 bytes, got {}",
            key.len()
        )));
    }
    let kek = kek_from_slice(kek)
        .ok_or_else(|| JweError::InvalidInput("key encryption key must be 32 bytes".into()))?;

    let mut wrapped = vec![0u8; key.len() + 8];
    kek.wrap(key, &mut wrapped)
        .map_err(|e| JweError::Encryption(format!("key wrap failed: {e:?}")))?;
    Ok(wrapped)
}

/// Unwraps a key previously wrapped with [`wrap_key`].
///
/// # Errors
///
/// Returns `CannotDecrypt` if the input is malformed or the integrity check fails.
pub fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<ContentEncryptionKey> {
    if wrapped.len() % 8 != 0 || wrapped.len() < 24 {
        return Err(JweError::CannotDecrypt);
    }
    let kek = kek_from_slice(kek).ok_or(JweError::CannotDecrypt)?;

    let mut key = Zeroizing::new(vec![0u8; wrapped.len() - 8]);
    kek.unwrap(wrapped, &mut key).map_err(|_| JweError::CannotDecrypt)?;
    Ok(ContentEncryptionKey::new(key))
}

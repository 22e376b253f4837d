//! Error types for JWE operations.
//!
//! These errors are internal to the cryptographic layer. When they cross into
//! the envelope engine they are converted into [`crate::Error`]; every
//! decryption-side failure collapses into a single generic `CannotDecrypt` so
//! that callers learn nothing about which check failed.

use std::error::Error as StdError;
use std::fmt;

use crate::error::{Error, MalformedKind};

/// Result type for JWE operations.
pub type Result<T> = std::result::Result<T, JweError>;

/// Errors that can occur during JWE operations.
///
/// # Examples
///
/// ```
/// use didcomm_envelope_core::jwe::error::JweError;
///
/// let error = JweError::InvalidInput("key length must be a multiple of 8".to_string());
/// assert_eq!(
///     error.to_string(),
///     "Invalid input: key length must be a multiple of 8"
/// );
/// ```
#[derive(Debug)]
pub enum JweError {
    /// Input to a primitive has the wrong shape (length, alignment)
    InvalidInput(String),

    /// Decryption, unwrapping or tag verification failed
    CannotDecrypt,

    /// Key bytes could not be parsed for the curve
    InvalidKeyMaterial(String),

    /// Algorithm or curve not supported
    Unsupported(String),

    /// Keys of different curves were combined
    IncompatibleCrypto(String),

    /// Error during encryption or key generation
    Encryption(String),
}

impl fmt::Display for JweError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::CannotDecrypt => write!(f, "Cannot decrypt"),
            Self::InvalidKeyMaterial(msg) => write!(f, "Invalid key material: {}", msg),
            Self::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Self::IncompatibleCrypto(msg) => write!(f, "Incompatible crypto: {}", msg),
            Self::Encryption(msg) => write!(f, "Encryption error: {}", msg),
        }
    }
}

impl StdError for JweError {}

impl From<JweError> for Error {
    fn from(err: JweError) -> Self {
        match err {
            JweError::CannotDecrypt => Error::malformed(MalformedKind::CanNotDecrypt),
            JweError::Unsupported(msg) => Error::Unsupported(msg),
            JweError::IncompatibleCrypto(msg) => Error::IncompatibleCrypto(msg),
            JweError::InvalidInput(msg) | JweError::InvalidKeyMaterial(msg) => Error::Value(msg),
            JweError::Encryption(msg) => Error::Value(format!("encryption failed: {msg}")),
        }
    }
}

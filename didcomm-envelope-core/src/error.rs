//! Error types for the didcomm-envelope-core crate.
//!
//! Every failure surfaced by a pack or unpack operation is one [`Error`] value.
//! Each variant carries a stable [`Error::code`] so callers and other
//! implementations can compare outcomes without matching on message text.
//!
//! Cryptographic failures are deliberately generic: an unpack that fails to
//! decrypt reports [`MalformedKind::CanNotDecrypt`] and nothing about which
//! check failed.

use std::fmt;

use thiserror::Error;

/// The reason a received message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MalformedKind {
    /// Decryption or key unwrapping failed.
    CanNotDecrypt,
    /// A signature did not verify.
    InvalidSignature,
    /// The innermost plaintext is not a valid DIDComm message.
    InvalidPlaintext,
    /// The envelope structure is invalid or inconsistent.
    InvalidMessage,
    /// The message uses a forward protocol version this crate does not speak.
    NotSupportedFwdProtocol,
}

impl MalformedKind {
    /// Numeric code for the kind.
    pub fn code(self) -> u8 {
        match self {
            MalformedKind::CanNotDecrypt => 1,
            MalformedKind::InvalidSignature => 2,
            MalformedKind::InvalidPlaintext => 3,
            MalformedKind::InvalidMessage => 4,
            MalformedKind::NotSupportedFwdProtocol => 5,
        }
    }

    /// Snake-case name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MalformedKind::CanNotDecrypt => "can_not_decrypt",
            MalformedKind::InvalidSignature => "invalid_signature",
            MalformedKind::InvalidPlaintext => "invalid_plaintext",
            MalformedKind::InvalidMessage => "invalid_message",
            MalformedKind::NotSupportedFwdProtocol => "not_supported_fwd_protocol",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            MalformedKind::CanNotDecrypt => "DIDComm message cannot be decrypted.",
            MalformedKind::InvalidSignature => "Signature verification failed.",
            MalformedKind::InvalidPlaintext => "Plaintext is invalid.",
            MalformedKind::InvalidMessage => "DIDComm message is invalid.",
            MalformedKind::NotSupportedFwdProtocol => "Not supported forward protocol.",
        }
    }
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for the DIDComm envelope engine
#[derive(Debug, Error)]
pub enum Error {
    /// An argument is not a valid DID or DID URL, or is inconsistent with the message
    #[error("Invalid value: {0}")]
    Value(String),

    /// Unknown algorithm, curve or key type
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Sender and recipient keys cannot be used together
    #[error("Incompatible crypto: {0}")]
    IncompatibleCrypto(String),

    /// No secret is available for the key
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    /// The DID resolver has no document for the DID
    #[error("DID `{0}` is not found in DID resolver")]
    DocumentNotResolved(String),

    /// The DID URL does not name a usable verification method
    #[error("DID URL `{0}` is not found")]
    DidUrlNotFound(String),

    /// A received message failed a structural or cryptographic check
    #[error("Malformed message ({kind}): {message}")]
    MalformedMessage {
        /// What kind of check failed
        kind: MalformedKind,
        /// Human readable detail
        message: String,
    },

    /// Serialization error
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a malformed-message error with the kind's default message.
    pub fn malformed(kind: MalformedKind) -> Self {
        Error::MalformedMessage {
            kind,
            message: kind.default_message().to_string(),
        }
    }

    /// Creates a malformed-message error with a specific message.
    pub fn malformed_with(kind: MalformedKind, message: impl Into<String>) -> Self {
        Error::MalformedMessage {
            kind,
            message: message.into(),
        }
    }

    /// Stable identifier of the error class.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Value(_) => "value_error",
            Error::Unsupported(_) => "unsupported",
            Error::IncompatibleCrypto(_) => "incompatible_crypto",
            Error::SecretNotFound(_) => "secret_not_found",
            Error::DocumentNotResolved(_) => "did_doc_not_resolved",
            Error::DidUrlNotFound(_) => "did_url_not_found",
            Error::MalformedMessage { kind, .. } => kind.as_str(),
            Error::Serialization(_) => "serialization",
        }
    }

    /// Returns the malformed kind if this is a malformed-message error.
    pub fn malformed_kind(&self) -> Option<MalformedKind> {
        match self {
            Error::MalformedMessage { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for the DIDComm envelope engine
pub type Result<T> = std::result::Result<T, Error>;

//! Prelude module for commonly used types and traits.
//!
//! Import everything from this module with
//! `use didcomm_envelope_core::prelude::*`.
//!
//! # Example
//!
//! ```rust
//! use didcomm_envelope_core::prelude::*;
//! use serde_json::json;
//!
//! let message = Message::new("https://didcomm.org/trust-ping/2.0/ping", json!({}))
//!     .from("did:example:alice")
//!     .to(["did:example:bob"]);
//! assert!(message.validate().is_ok());
//! ```

// Re-export error types
pub use crate::error::{Error, MalformedKind, Result};

// Re-export resolver traits
pub use crate::resolvers::{DidResolver, ResolversConfig, SecretsResolver};

// Re-export message types
pub use crate::from_prior::FromPrior;
pub use crate::types::{Attachment, AttachmentData, FromPriorField, Message};

// Re-export DID and key types
pub use crate::did::DidDoc;
pub use crate::secrets::Secret;

// Re-export algorithm choices
pub use crate::jwe::{AnonCryptAlg, AuthCryptAlg};

// Re-export core functions
pub use crate::pack::{pack_encrypted, pack_plaintext, pack_signed, PackEncryptedConfig};
pub use crate::unpack::{unpack, UnpackMetadata};

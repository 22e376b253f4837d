//! Core `DIDComm` v2 envelope engine.
//!
//! This crate turns plaintext `DIDComm` messages into their wire forms and back,
//! recovering who signed and who encrypted a received message along the way.
//!
//! # Features
//!
//! - Packing with different security levels:
//!   - Plaintext: no protection, optional `from_prior` DID rotation claim
//!   - Signed: a JWS over the message (`EdDSA`, `ES256`, `ES256K`)
//!   - Authcrypt: `ECDH-1PU+A256KW` encryption identifying the sender
//!   - Anoncrypt: `ECDH-ES+A256KW` encryption hiding the sender
//! - Sender protection (authcrypt wrapped in anoncrypt) and routing 2.0
//!   forward wrapping for recipients behind mediators
//! - Unpacking of nested envelopes of any shape, with provenance metadata
//! - X25519, P-256 and P-384 key agreement; JWK, multibase and base58 keys
//!
//! # Architecture
//!
//! The crate is organized into these main modules:
//! - `pack` / `unpack`: the envelope engine
//! - `jwe` / `jws`: envelope structures and the cryptography beneath them
//! - `resolvers`: the DID and secrets resolver traits the engine consumes
//! - `types`: the plaintext message model
//! - `error`: error types and handling
//!
//! # Examples
//!
//! ```rust,no_run
//! use didcomm_envelope_core::prelude::*;
//! use serde_json::json;
//!
//! async fn example(resolvers: &ResolversConfig) -> Result<()> {
//!     let message = Message::new("https://didcomm.org/basicmessage/2.0/message", json!({"content": "hi"}))
//!         .from("did:example:alice")
//!         .to(["did:example:bob"]);
//!
//!     let (packed, _) = pack_encrypted(
//!         &message,
//!         "did:example:bob",
//!         Some("did:example:alice"),
//!         None,
//!         resolvers,
//!         &PackEncryptedConfig::default(),
//!     )
//!     .await?;
//!
//!     let (unpacked, metadata) = unpack(&packed, resolvers).await?;
//!     assert!(metadata.authenticated);
//!     assert_eq!(unpacked.id, message.id);
//!     Ok(())
//! }
//! ```
//!
//! # Security Considerations
//!
//! - Decryption and signature failures are reported without detail
//! - Private keys are held in zeroizing buffers and dropped at the end of each call
//! - Resolver failures are never retried; retry policy belongs to the resolver

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod did;
pub mod envelope;
pub mod error;
pub mod forward;
pub mod from_prior;
pub mod jwe;
pub mod jws;
pub mod keys;
pub mod pack;
pub mod prelude;
pub mod resolvers;
pub mod secrets;
pub mod types;
pub mod unpack;
pub mod utils;

#[cfg(test)]
pub(crate) mod tests;

pub use did::{DidCommMessagingService, DidDoc, Service, VerificationMethod};
pub use error::{Error, MalformedKind, Result};
pub use from_prior::FromPrior;
pub use jwe::{AnonCryptAlg, AuthCryptAlg};
pub use keys::{KeyCurve, KeyMaterial, SignAlg};
pub use pack::{
    pack_encrypted, pack_plaintext, pack_signed, PackEncryptedConfig, PackEncryptedMetadata,
    PackPlaintextMetadata, PackSignedMetadata,
};
pub use resolvers::{
    DidResolver, InMemoryDidResolver, InMemorySecretsResolver, ResolversConfig, SecretsResolver,
};
pub use secrets::{Secret, SecretMaterial};
pub use types::{Attachment, AttachmentData, Message};
pub use unpack::{unpack, UnpackMetadata};

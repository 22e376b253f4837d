//! JWE (JSON Web Encryption) implementation for `DIDComm`.
//!
//! This module provides the encryption half of the envelope engine:
//! `AnonCrypt` (`ECDH-ES+A256KW`) and `AuthCrypt` (`ECDH-1PU+A256KW`) key
//! agreement, AES key wrapping of one shared content encryption key for any
//! number of recipients, and the three `DIDComm` v2 content ciphers.
//!
//! The implementation follows RFC 7516 (JSON Web Encryption) and the key
//! agreement drafts referenced by the `DIDComm` v2 specification.
//!
//! # Features
//!
//! - `ECDH-ES+A256KW` and `ECDH-1PU+A256KW` key agreement
//! - Content encryption with `A256CBC-HS512`, `A256GCM` and `XC20P`
//! - `X25519`, `P-256` and `P-384` key agreement curves
//! - Multiple recipients sharing one content encryption key
//! - APU/APV binding of sender and recipient kids into the KDF
//!
//! # Examples
//!
//! ```rust
//! use didcomm_envelope_core::jwe::{
//!     derive_anoncrypt_cek, resolve_cek_for_recipient, AnonCryptAlg, JweHeader, JweMessage,
//! };
//! use didcomm_envelope_core::keys::{KeyCurve, KeyMaterial};
//!
//! let bob = KeyMaterial::generate(KeyCurve::X25519);
//! let alg = AnonCryptAlg::default();
//! let derivation = derive_anoncrypt_cek(alg, &[("did:example:bob#key-1", &bob)]).unwrap();
//! let header = JweHeader::new_anoncrypt(alg.algs().enc, derivation.epk, derivation.apv);
//! let jwe = JweMessage::build(&header, &derivation.cek, &derivation.encrypted_keys, b"hi").unwrap();
//!
//! let wrapped = jwe.encrypted_key_for("did:example:bob#key-1").unwrap();
//! let cek = resolve_cek_for_recipient(&header, &bob, None, &wrapped).unwrap();
//! assert_eq!(jwe.decrypt(&cek).unwrap(), b"hi");
//! ```
//!
//! # Security Considerations
//!
//! - Private keys, shared secrets and CEKs are zeroized when dropped
//! - Every decryption failure is reported as the same generic error

pub mod algorithms;
pub mod error;
pub mod header;
pub mod key_agreement;
pub mod key_wrapping;
pub mod message;
pub mod types;

pub use self::error::JweError;
pub use self::header::{EphemeralPublicKey, JweHeader, ENCRYPTED_TYP};
pub use self::key_agreement::{
    calculate_apv, concat_kdf, derive_anoncrypt_cek, derive_authcrypt_cek,
    resolve_cek_for_recipient, CekDerivation,
};
pub use self::key_wrapping::{unwrap_key, wrap_key, ContentEncryptionKey};
pub use self::message::{JweMessage, JweRecipient, JweRecipientHeader};
pub use self::types::{
    Algs, AnonCryptAlg, AuthCryptAlg, ContentEncryptionAlgorithm, EcdhCurve, KeyAgreementAlgorithm,
};

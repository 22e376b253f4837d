//! Common types for JWE operations.
//!
//! This module provides the algorithm identifiers used in DIDComm v2 JWE
//! envelopes, the curves available for ECDH key agreement, and the two
//! algorithm registries ([`AnonCryptAlg`], [`AuthCryptAlg`]) that pack
//! operations choose from.

use serde::{Deserialize, Serialize};

use super::algorithms::{self, EncryptedContent};
use super::error::Result;

/// Key agreement algorithms supported for JWE.
///
/// # Examples
///
/// ```rust
/// use didcomm_envelope_core::jwe::types::KeyAgreementAlgorithm;
///
/// let alg = KeyAgreementAlgorithm::EcdhEsA256kw;
/// assert_eq!(alg.to_string(), "ECDH-ES+A256KW");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAgreementAlgorithm {
    /// ECDH-ES with AES key wrap (anoncrypt)
    #[serde(rename = "ECDH-ES+A256KW")]
    EcdhEsA256kw,
    /// ECDH-1PU with AES key wrap (authcrypt)
    #[serde(rename = "ECDH-1PU+A256KW")]
    Ecdh1puA256kw,
}

impl KeyAgreementAlgorithm {
    /// The JOSE identifier, also used as the Concat KDF `AlgorithmID`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdhEsA256kw => "ECDH-ES+A256KW",
            Self::Ecdh1puA256kw => "ECDH-1PU+A256KW",
        }
    }
}

impl std::fmt::Display for KeyAgreementAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content encryption algorithms supported for JWE.
///
/// - `A256CBC-HS512` provides authenticated encryption with HMAC
/// - `A256GCM` provides authenticated encryption with GCM
/// - `XC20P` is `XChaCha20-Poly1305`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    /// AES-256-CBC with HMAC-SHA-512 for authentication
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
    /// AES-256-GCM
    #[serde(rename = "A256GCM")]
    A256Gcm,
    /// XChaCha20-Poly1305
    #[serde(rename = "XC20P")]
    Xc20P,
}

impl ContentEncryptionAlgorithm {
    /// Length in bytes of the content encryption key.
    pub fn key_len(&self) -> usize {
        match self {
            Self::A256CbcHs512 => 64,
            Self::A256Gcm | Self::Xc20P => 32,
        }
    }

    /// Encrypts `plaintext` with a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the key does not have [`Self::key_len`] bytes.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8], key: &[u8]) -> Result<EncryptedContent> {
        match self {
            Self::A256CbcHs512 => algorithms::encrypt_aes_cbc_hmac(plaintext, aad, key),
            Self::A256Gcm => algorithms::encrypt_aes_gcm(plaintext, aad, key),
            Self::Xc20P => algorithms::encrypt_xchacha20poly1305(plaintext, aad, key),
        }
    }

    /// Decrypts and authenticates.
    ///
    /// # Errors
    ///
    /// Every failure is reported as `CannotDecrypt`.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        tag: &[u8],
        aad: &[u8],
        key: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            Self::A256CbcHs512 => algorithms::decrypt_aes_cbc_hmac(ciphertext, iv, tag, aad, key),
            Self::A256Gcm => algorithms::decrypt_aes_gcm(ciphertext, iv, tag, aad, key),
            Self::Xc20P => algorithms::decrypt_xchacha20poly1305(ciphertext, iv, tag, aad, key),
        }
    }
}

impl std::fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A256CbcHs512 => write!(f, "A256CBC-HS512"),
            Self::A256Gcm => write!(f, "A256GCM"),
            Self::Xc20P => write!(f, "XC20P"),
        }
    }
}

/// Elliptic curves supported for ECDH key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcdhCurve {
    /// X25519 curve (Curve25519)
    X25519,
    /// NIST P-256 curve
    #[serde(rename = "P-256")]
    P256,
    /// NIST P-384 curve
    #[serde(rename = "P-384")]
    P384,
}

impl std::fmt::Display for EcdhCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X25519 => write!(f, "X25519"),
            Self::P256 => write!(f, "P-256"),
            Self::P384 => write!(f, "P-384"),
        }
    }
}

/// A key agreement algorithm paired with a content encryption algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Algs {
    /// Key wrapping algorithm (`alg` header)
    pub alg: KeyAgreementAlgorithm,
    /// Content encryption algorithm (`enc` header)
    pub enc: ContentEncryptionAlgorithm,
}

/// Algorithms available for anonymous encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnonCryptAlg {
    /// `ECDH-ES+A256KW` with `A256CBC-HS512`
    A256cbcHs512EcdhEsA256kw,
    /// `ECDH-ES+A256KW` with `XC20P`
    #[default]
    Xc20pEcdhEsA256kw,
    /// `ECDH-ES+A256KW` with `A256GCM`
    A256gcmEcdhEsA256kw,
}

impl AnonCryptAlg {
    /// The `(alg, enc)` pair for this choice.
    pub fn algs(&self) -> Algs {
        let enc = match self {
            Self::A256cbcHs512EcdhEsA256kw => ContentEncryptionAlgorithm::A256CbcHs512,
            Self::Xc20pEcdhEsA256kw => ContentEncryptionAlgorithm::Xc20P,
            Self::A256gcmEcdhEsA256kw => ContentEncryptionAlgorithm::A256Gcm,
        };
        Algs {
            alg: KeyAgreementAlgorithm::EcdhEsA256kw,
            enc,
        }
    }

    /// Finds the registry entry for a received `enc`.
    pub fn from_enc(enc: ContentEncryptionAlgorithm) -> Self {
        match enc {
            ContentEncryptionAlgorithm::A256CbcHs512 => Self::A256cbcHs512EcdhEsA256kw,
            ContentEncryptionAlgorithm::Xc20P => Self::Xc20pEcdhEsA256kw,
            ContentEncryptionAlgorithm::A256Gcm => Self::A256gcmEcdhEsA256kw,
        }
    }
}

/// Algorithms available for authenticated encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthCryptAlg {
    /// `ECDH-1PU+A256KW` with `A256CBC-HS512`
    #[default]
    A256cbcHs512Ecdh1puA256kw,
}

impl AuthCryptAlg {
    /// The `(alg, enc)` pair for this choice.
    pub fn algs(&self) -> Algs {
        match self {
            Self::A256cbcHs512Ecdh1puA256kw => Algs {
                alg: KeyAgreementAlgorithm::Ecdh1puA256kw,
                enc: ContentEncryptionAlgorithm::A256CbcHs512,
            },
        }
    }

    /// Finds the registry entry for a received `enc`, if ECDH-1PU allows it.
    pub fn from_enc(enc: ContentEncryptionAlgorithm) -> Option<Self> {
        match enc {
            ContentEncryptionAlgorithm::A256CbcHs512 => Some(Self::A256cbcHs512Ecdh1puA256kw),
            _ => None,
        }
    }
}

//! Secrets: private keys bound to DID URLs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::did::VerificationMethodType;

/// A private key bound to a DID URL, supplied by a secrets resolver.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret {
    /// DID URL (kid) of the key
    pub id: String,
    /// Verification method type of the key
    #[serde(rename = "type")]
    pub type_: VerificationMethodType,
    /// Private key material
    #[serde(flatten)]
    pub secret_material: SecretMaterial,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("type_", &self.type_)
            .finish_non_exhaustive()
    }
}

/// Private key material of a [`Secret`], by format.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretMaterial {
    /// `privateKeyJwk`
    Jwk {
        /// JWK including `d`
        #[serde(rename = "privateKeyJwk")]
        private_key_jwk: Value,
    },
    /// `privateKeyMultibase`
    Multibase {
        /// Multibase-encoded private key with multicodec prefix
        #[serde(rename = "privateKeyMultibase")]
        private_key_multibase: String,
    },
    /// `privateKeyBase58`
    Base58 {
        /// Base58-encoded raw private key
        #[serde(rename = "privateKeyBase58")]
        private_key_base58: String,
    },
}

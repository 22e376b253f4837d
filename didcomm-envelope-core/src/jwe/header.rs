//! JWE header types and functionality.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{ContentEncryptionAlgorithm, EcdhCurve, KeyAgreementAlgorithm};
use crate::jwe::error::{JweError, Result};
use crate::utils::{b64_decode, b64_encode};

/// Media type placed in the `typ` header of encrypted envelopes.
pub const ENCRYPTED_TYP: &str = "application/didcomm-encrypted+json";

/// The protected header of a JWE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweHeader {
    /// The media type of the envelope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// The key agreement algorithm
    pub alg: KeyAgreementAlgorithm,

    /// The content encryption algorithm
    pub enc: ContentEncryptionAlgorithm,

    /// The ephemeral public key
    pub epk: EphemeralPublicKey,

    /// The sender key ID (authcrypt only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skid: Option<String>,

    /// The agreement PartyUInfo (authcrypt only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,

    /// The agreement PartyVInfo
    pub apv: String,

    /// Additional header parameters
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

/// An ephemeral public key for ECDH, in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralPublicKey {
    /// The key type ("OKP" or "EC")
    pub kty: String,

    /// The curve used
    pub crv: EcdhCurve,

    /// The public key x-coordinate (base64url-encoded)
    pub x: String,

    /// The public key y-coordinate (base64url-encoded, only for NIST curves)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl JweHeader {
    /// Creates a new JWE header for anoncrypt (ECDH-ES+A256KW).
    pub fn new_anoncrypt(
        content_encryption: ContentEncryptionAlgorithm,
        epk: EphemeralPublicKey,
        apv: String,
    ) -> Self {
        Self {
            typ: Some(ENCRYPTED_TYP.to_string()),
            alg: KeyAgreementAlgorithm::EcdhEsA256kw,
            enc: content_encryption,
            epk,
            skid: None,
            apu: None,
            apv,
            additional: BTreeMap::new(),
        }
    }

    /// Creates a new JWE header for authcrypt (ECDH-1PU+A256KW).
    pub fn new_authcrypt(
        content_encryption: ContentEncryptionAlgorithm,
        epk: EphemeralPublicKey,
        skid: String,
        apu: String,
        apv: String,
    ) -> Self {
        Self {
            typ: Some(ENCRYPTED_TYP.to_string()),
            alg: KeyAgreementAlgorithm::Ecdh1puA256kw,
            enc: content_encryption,
            epk,
            skid: Some(skid),
            apu: Some(apu),
            apv,
            additional: BTreeMap::new(),
        }
    }

    /// Serializes the header to its base64url-encoded form.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_vec(self)
            .map(b64_encode)
            .map_err(|e| JweError::Encryption(format!("header serialization failed: {e}")))
    }

    /// Deserializes a header from its base64url-encoded form.
    pub fn decode(s: &str) -> Result<Self> {
        let bytes = b64_decode(s)
            .map_err(|e| JweError::InvalidInput(format!("protected header is not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| JweError::InvalidInput(format!("protected header is invalid: {}", e)))
    }

    /// Decoded `apu` bytes, empty when absent.
    pub fn apu_bytes(&self) -> Result<Vec<u8>> {
        match &self.apu {
            Some(apu) => b64_decode(apu)
                .map_err(|e| JweError::InvalidInput(format!("apu is not base64url: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Decoded `apv` bytes.
    pub fn apv_bytes(&self) -> Result<Vec<u8>> {
        b64_decode(&self.apv).map_err(|e| JweError::InvalidInput(format!("apv is not base64url: {}", e)))
    }
}

/// Length of one affine coordinate for NIST curves; `None` for X25519.
fn coordinate_len(curve: EcdhCurve) -> Option<usize> {
    match curve {
        EcdhCurve::X25519 => None,
        EcdhCurve::P256 => Some(32),
        EcdhCurve::P384 => Some(48),
    }
}

fn invalid_epk(message: &str) -> JweError {
    JweError::InvalidKeyMaterial(format!("epk: {message}"))
}

impl EphemeralPublicKey {
    /// Builds the JWK form of an ephemeral public key.
    ///
    /// X25519 keys are the raw 32 bytes; NIST curve keys are uncompressed SEC1
    /// points (`0x04 || x || y`).
    pub fn new(curve: EcdhCurve, public_key: &[u8]) -> Result<Self> {
        let Some(len) = coordinate_len(curve) else {
            if public_key.len() != 32 {
                return Err(invalid_epk("X25519 key must be 32 bytes"));
            }
            return Ok(Self {
                kty: "OKP".to_string(),
                crv: curve,
                x: b64_encode(public_key),
                y: None,
            });
        };
        match public_key.split_first() {
            Some((&0x04, point)) if point.len() == 2 * len => {
                let (x, y) = point.split_at(len);
                Ok(Self {
                    kty: "EC".to_string(),
                    crv: curve,
                    x: b64_encode(x),
                    y: Some(b64_encode(y)),
                })
            }
            _ => Err(invalid_epk(&format!("{curve} key must be an uncompressed point"))),
        }
    }

    /// The raw public key: 32 bytes for X25519, an uncompressed SEC1 point
    /// otherwise.
    ///
    /// # Errors
    ///
    /// `InvalidKeyMaterial` if `kty` does not fit `crv`, a coordinate is not
    /// base64url or has the wrong length.
    pub fn raw_public_key(&self) -> Result<Vec<u8>> {
        let x = b64_decode(&self.x).map_err(|_| invalid_epk("x is not base64url"))?;
        match (coordinate_len(self.crv), self.kty.as_str(), self.y.as_deref()) {
            (None, "OKP", None) if x.len() == 32 => Ok(x),
            (Some(len), "EC", Some(y)) => {
                let y = b64_decode(y).map_err(|_| invalid_epk("y is not base64url"))?;
                if x.len() != len || y.len() != len {
                    return Err(invalid_epk("coordinate length does not match the curve"));
                }
                Ok([&[0x04u8][..], x.as_slice(), y.as_slice()].concat())
            }
            _ => Err(invalid_epk(&format!("not a valid {} {} key", self.kty, self.crv))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::algorithms::generate_ephemeral_keypair;
    use pretty_assertions::assert_eq;

    fn x25519_epk() -> EphemeralPublicKey {
        let (_, public) = generate_ephemeral_keypair(EcdhCurve::X25519);
        EphemeralPublicKey::new(EcdhCurve::X25519, &public).unwrap()
    }

    #[test]
    fn test_authcrypt_header_carries_sender() {
        let kid = "did:example:alice#key-x25519-1";
        let header = JweHeader::new_authcrypt(
            ContentEncryptionAlgorithm::A256CbcHs512,
            x25519_epk(),
            kid.to_string(),
            b64_encode(kid),
            b64_encode([7u8; 32]),
        );

        assert_eq!(header.typ.as_deref(), Some(ENCRYPTED_TYP));
        assert_eq!(header.skid.as_deref(), Some(kid));
        assert_eq!(header.apu_bytes().unwrap(), kid.as_bytes());
        assert_eq!(header.apv_bytes().unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn test_anoncrypt_header_wire_form() {
        let mut header = JweHeader::new_anoncrypt(
            ContentEncryptionAlgorithm::Xc20P,
            x25519_epk(),
            b64_encode([1u8; 32]),
        );
        header
            .additional
            .insert("x-trace".to_string(), Value::String("abc".to_string()));

        let encoded = header.encode().unwrap();
        assert_eq!(JweHeader::decode(&encoded).unwrap(), header);

        let json: Value = serde_json::from_slice(&b64_decode(&encoded).unwrap()).unwrap();
        assert_eq!(json["typ"], ENCRYPTED_TYP);
        assert_eq!(json["alg"], "ECDH-ES+A256KW");
        assert_eq!(json["enc"], "XC20P");
        assert_eq!(json["epk"]["kty"], "OKP");
        assert_eq!(json["x-trace"], "abc");
        assert!(json.get("skid").is_none() && json.get("apu").is_none());
        assert!(header.apu_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_epk_points_per_curve() {
        for curve in [EcdhCurve::X25519, EcdhCurve::P256, EcdhCurve::P384] {
            let (_, public) = generate_ephemeral_keypair(curve);
            let epk = EphemeralPublicKey::new(curve, &public).unwrap();
            assert_eq!(epk.kty, if curve == EcdhCurve::X25519 { "OKP" } else { "EC" });
            assert_eq!(epk.raw_public_key().unwrap(), public);
        }
    }

    #[test]
    fn test_epk_rejects_bad_points() {
        assert!(EphemeralPublicKey::new(EcdhCurve::X25519, &[0; 31]).is_err());
        assert!(EphemeralPublicKey::new(EcdhCurve::P256, &[0x03; 65]).is_err());
        assert!(EphemeralPublicKey::new(EcdhCurve::P384, &[0x04; 65]).is_err());

        let mut mislabeled = x25519_epk();
        mislabeled.kty = "EC".to_string();
        assert!(mislabeled.raw_public_key().is_err());

        let (_, public) = generate_ephemeral_keypair(EcdhCurve::P256);
        let mut truncated = EphemeralPublicKey::new(EcdhCurve::P256, &public).unwrap();
        truncated.y = Some(b64_encode([0u8; 31]));
        assert!(truncated.raw_public_key().is_err());
    }
}

//! Key extraction, signature algorithm selection, signing and verification.
//!
//! Verification methods and secrets carry key material in one of three formats
//! (JWK, multibase, base58). [`KeyMaterial`] normalizes all of them into raw
//! curve bytes: 32-byte keys for `Ed25519`/`X25519`, uncompressed SEC1 points
//! for the NIST and `secp256k1` curves. Private bytes are wiped on drop.

use multibase::Base;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::did::{VerificationMaterial, VerificationMethod, VerificationMethodType};
use crate::error::{Error, Result};
use crate::jwe::algorithms::generate_ephemeral_keypair;
use crate::jwe::EcdhCurve;
use crate::secrets::{Secret, SecretMaterial};
use crate::utils::{b64_decode, b64_encode};

/// Curves the crate can extract keys for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCurve {
    /// Ed25519 signing keys
    Ed25519,
    /// X25519 key agreement keys
    X25519,
    /// NIST P-256
    P256,
    /// NIST P-384
    P384,
    /// secp256k1
    Secp256k1,
}

impl KeyCurve {
    /// The JWK `crv` name.
    pub fn jwk_name(&self) -> &'static str {
        match self {
            KeyCurve::Ed25519 => "Ed25519",
            KeyCurve::X25519 => "X25519",
            KeyCurve::P256 => "P-256",
            KeyCurve::P384 => "P-384",
            KeyCurve::Secp256k1 => "secp256k1",
        }
    }

    fn from_jwk_name(crv: &str) -> Result<Self> {
        match crv {
            "Ed25519" => Ok(KeyCurve::Ed25519),
            "X25519" => Ok(KeyCurve::X25519),
            "P-256" => Ok(KeyCurve::P256),
            "P-384" => Ok(KeyCurve::P384),
            "secp256k1" => Ok(KeyCurve::Secp256k1),
            other => Err(Error::Unsupported(format!("Unsupported curve: {other}"))),
        }
    }

    /// The ECDH curve, if this curve can be used for key agreement.
    pub fn ecdh_curve(&self) -> Option<EcdhCurve> {
        match self {
            KeyCurve::X25519 => Some(EcdhCurve::X25519),
            KeyCurve::P256 => Some(EcdhCurve::P256),
            KeyCurve::P384 => Some(EcdhCurve::P384),
            KeyCurve::Ed25519 | KeyCurve::Secp256k1 => None,
        }
    }

    fn coordinate_len(&self) -> usize {
        match self {
            KeyCurve::P384 => 48,
            _ => 32,
        }
    }
}

impl std::fmt::Display for KeyCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.jwk_name())
    }
}

/// JWS signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignAlg {
    /// Ed25519
    #[serde(rename = "EdDSA")]
    EdDsa,
    /// ECDSA over P-256 with SHA-256
    #[serde(rename = "ES256")]
    Es256,
    /// ECDSA over secp256k1 with SHA-256
    #[serde(rename = "ES256K")]
    Es256K,
}

impl std::fmt::Display for SignAlg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignAlg::EdDsa => write!(f, "EdDSA"),
            SignAlg::Es256 => write!(f, "ES256"),
            SignAlg::Es256K => write!(f, "ES256K"),
        }
    }
}

/// A JSON Web Key as found in `publicKeyJwk` and `privateKeyJwk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("OKP" or "EC")
    pub kty: String,
    /// Curve name
    pub crv: String,
    /// Public x coordinate or OKP public key
    pub x: String,
    /// Public y coordinate (EC only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

// Multicodec varint prefixes.
const ED25519_PUB: [u8; 2] = [0xed, 0x01];
const X25519_PUB: [u8; 2] = [0xec, 0x01];
const SECP256K1_PUB: [u8; 2] = [0xe7, 0x01];
const P256_PUB: [u8; 2] = [0x80, 0x24];
const P384_PUB: [u8; 2] = [0x81, 0x24];
const ED25519_PRIV: [u8; 2] = [0x80, 0x26];
const SECP256K1_PRIV: [u8; 2] = [0x81, 0x26];
const X25519_PRIV: [u8; 2] = [0x82, 0x26];
const P256_PRIV: [u8; 2] = [0x86, 0x26];
const P384_PRIV: [u8; 2] = [0x87, 0x26];

/// Raw key bytes for one curve, optionally with the private part.
#[derive(Clone)]
pub struct KeyMaterial {
    curve: KeyCurve,
    public: Vec<u8>,
    private: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("curve", &self.curve)
            .field("public", &b64_encode(&self.public))
            .field("private", &self.private.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl KeyMaterial {
    /// Builds key material from a public key and an optional private key.
    ///
    /// EC public keys may be compressed or uncompressed; they are stored uncompressed.
    pub fn new(curve: KeyCurve, public: &[u8], private: Option<Zeroizing<Vec<u8>>>) -> Result<Self> {
        let public = normalize_public(curve, public)?;
        Ok(Self {
            curve,
            public,
            private,
        })
    }

    /// Builds key material from a private key alone, deriving the public key.
    pub fn from_private(curve: KeyCurve, private: Zeroizing<Vec<u8>>) -> Result<Self> {
        let public = public_from_private(curve, &private)?;
        Ok(Self {
            curve,
            public,
            private: Some(private),
        })
    }

    /// Generates a fresh key pair.
    pub fn generate(curve: KeyCurve) -> Self {
        use rand_core::OsRng;

        let (private, public) = match curve {
            KeyCurve::Ed25519 => {
                let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
                (
                    Zeroizing::new(signing.to_bytes().to_vec()),
                    signing.verifying_key().to_bytes().to_vec(),
                )
            }
            KeyCurve::Secp256k1 => {
                use k256::elliptic_curve::sec1::ToEncodedPoint;
                let secret = k256::SecretKey::random(&mut OsRng);
                (
                    Zeroizing::new(secret.to_bytes().to_vec()),
                    secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
                )
            }
            KeyCurve::X25519 => generate_ephemeral_keypair(EcdhCurve::X25519),
            KeyCurve::P256 => generate_ephemeral_keypair(EcdhCurve::P256),
            KeyCurve::P384 => generate_ephemeral_keypair(EcdhCurve::P384),
        };
        Self {
            curve,
            public,
            private: Some(private),
        }
    }

    /// Extracts the public key of a verification method.
    ///
    /// # Errors
    ///
    /// `Unsupported` for unknown curves, codecs or material formats; `Value`
    /// for undecodable material.
    pub fn from_verification_method(method: &VerificationMethod) -> Result<Self> {
        match &method.verification_material {
            VerificationMaterial::Jwk { public_key_jwk } => {
                let jwk: Jwk = serde_json::from_value(public_key_jwk.clone())
                    .map_err(|e| Error::Value(format!("Invalid JWK in {}: {}", method.id, e)))?;
                Self::from_jwk(&jwk, false)
            }
            VerificationMaterial::Multibase {
                public_key_multibase,
            } => Self::from_multibase(public_key_multibase),
            VerificationMaterial::Base58 { public_key_base58 } => {
                let curve = curve_for_type(&method.type_)?;
                let bytes = bs58::decode(public_key_base58)
                    .into_vec()
                    .map_err(|e| Error::Value(format!("Invalid base58 in {}: {}", method.id, e)))?;
                Self::new(curve, &bytes, None)
            }
            VerificationMaterial::Other(_) => Err(Error::Unsupported(format!(
                "Unsupported verification material in {}",
                method.id
            ))),
        }
    }

    /// Extracts a key pair from a secret.
    ///
    /// # Errors
    ///
    /// As [`KeyMaterial::from_verification_method`]; additionally `Value` if the
    /// secret carries no private part.
    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let key = match &secret.secret_material {
            SecretMaterial::Jwk { private_key_jwk } => {
                let jwk: Jwk = serde_json::from_value(private_key_jwk.clone())
                    .map_err(|e| Error::Value(format!("Invalid JWK in secret {}: {}", secret.id, e)))?;
                Self::from_jwk(&jwk, true)?
            }
            SecretMaterial::Multibase {
                private_key_multibase,
            } => Self::from_multibase(private_key_multibase)?,
            SecretMaterial::Base58 { private_key_base58 } => {
                let curve = curve_for_type(&secret.type_)?;
                let mut bytes = Zeroizing::new(
                    bs58::decode(private_key_base58)
                        .into_vec()
                        .map_err(|e| Error::Value(format!("Invalid base58 in secret {}: {}", secret.id, e)))?,
                );
                // Ed25519 keypair encoding: seed followed by the public key.
                if curve == KeyCurve::Ed25519 && bytes.len() == 64 {
                    bytes.truncate(32);
                }
                Self::from_private(curve, bytes)?
            }
        };
        if key.private.is_none() {
            return Err(Error::Value(format!("Secret {} has no private key", secret.id)));
        }
        Ok(key)
    }

    fn from_jwk(jwk: &Jwk, with_private: bool) -> Result<Self> {
        let curve = KeyCurve::from_jwk_name(&jwk.crv)?;
        let expected_kty = match curve {
            KeyCurve::Ed25519 | KeyCurve::X25519 => "OKP",
            _ => "EC",
        };
        if jwk.kty != expected_kty {
            return Err(Error::Unsupported(format!(
                "Unsupported key type {} for curve {}",
                jwk.kty, jwk.crv
            )));
        }

        let decode = |field: &str, value: &str| {
            b64_decode(value).map_err(|e| Error::Value(format!("Invalid JWK {field}: {e}")))
        };
        let x = decode("x", &jwk.x)?;
        let public = match jwk.y.as_deref() {
            Some(y) if expected_kty == "EC" => {
                let y = decode("y", y)?;
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(&x);
                point.extend_from_slice(&y);
                point
            }
            None if expected_kty == "EC" => {
                return Err(Error::Value("EC JWK is missing y".to_string()));
            }
            _ => x,
        };

        let private = match (with_private, jwk.d.as_deref()) {
            (true, Some(d)) => Some(Zeroizing::new(decode("d", d)?)),
            _ => None,
        };
        Self::new(curve, &public, private)
    }

    fn from_multibase(value: &str) -> Result<Self> {
        let (base, bytes) = multibase::decode(value)
            .map_err(|e| Error::Value(format!("Invalid multibase value: {e}")))?;
        if base != Base::Base58Btc {
            return Err(Error::Unsupported(
                "Only base58btc multibase keys are supported".to_string(),
            ));
        }
        let bytes = Zeroizing::new(bytes);
        if bytes.len() < 2 {
            return Err(Error::Value("Multibase key is too short".to_string()));
        }

        let prefix = [bytes[0], bytes[1]];
        let body = &bytes[2..];
        let public_curve = match prefix {
            ED25519_PUB => Some(KeyCurve::Ed25519),
            X25519_PUB => Some(KeyCurve::X25519),
            SECP256K1_PUB => Some(KeyCurve::Secp256k1),
            P256_PUB => Some(KeyCurve::P256),
            P384_PUB => Some(KeyCurve::P384),
            _ => None,
        };
        if let Some(curve) = public_curve {
            return Self::new(curve, body, None);
        }

        let private_curve = match prefix {
            ED25519_PRIV => KeyCurve::Ed25519,
            SECP256K1_PRIV => KeyCurve::Secp256k1,
            X25519_PRIV => KeyCurve::X25519,
            P256_PRIV => KeyCurve::P256,
            P384_PRIV => KeyCurve::P384,
            _ => {
                return Err(Error::Unsupported(format!(
                    "Unsupported multicodec prefix {:02x}{:02x}",
                    prefix[0], prefix[1]
                )))
            }
        };
        Self::from_private(private_curve, Zeroizing::new(body.to_vec()))
    }

    /// The curve of this key.
    pub fn curve(&self) -> KeyCurve {
        self.curve
    }

    /// The ECDH curve, if the key can be used for key agreement.
    pub fn ecdh_curve(&self) -> Option<EcdhCurve> {
        self.curve.ecdh_curve()
    }

    /// Raw public key bytes.
    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Raw private key bytes, if present.
    pub fn private_bytes(&self) -> Option<&[u8]> {
        self.private.as_deref().map(Vec::as_slice)
    }

    /// The public key as a JWK object.
    pub fn public_jwk(&self) -> Value {
        self.jwk(false)
    }

    /// The key pair as a JWK object including `d`.
    pub fn private_jwk(&self) -> Value {
        self.jwk(true)
    }

    fn jwk(&self, with_private: bool) -> Value {
        let mut jwk = match self.curve {
            KeyCurve::Ed25519 | KeyCurve::X25519 => json!({
                "kty": "OKP",
                "crv": self.curve.jwk_name(),
                "x": b64_encode(&self.public),
            }),
            _ => {
                let len = self.curve.coordinate_len();
                json!({
                    "kty": "EC",
                    "crv": self.curve.jwk_name(),
                    "x": b64_encode(&self.public[1..1 + len]),
                    "y": b64_encode(&self.public[1 + len..]),
                })
            }
        };
        if let (true, Some(private), Some(map)) =
            (with_private, self.private.as_ref(), jwk.as_object_mut())
        {
            map.insert("d".to_string(), Value::String(b64_encode(private.as_slice())));
        }
        jwk
    }

    /// Signs `input` with the private key.
    ///
    /// # Errors
    ///
    /// `Value` if the key has no private part or it is malformed; `Unsupported`
    /// if the curve has no signature algorithm.
    pub fn sign(&self, input: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private_bytes()
            .ok_or_else(|| Error::Value("Key has no private part".to_string()))?;
        match select_sign_alg(self)? {
            SignAlg::EdDsa => {
                use ed25519_dalek::Signer;
                let seed: [u8; 32] = private
                    .try_into()
                    .map_err(|_| Error::Value("Ed25519 private key must be 32 bytes".to_string()))?;
                let key = ed25519_dalek::SigningKey::from_bytes(&seed);
                Ok(key.sign(input).to_bytes().to_vec())
            }
            SignAlg::Es256 => {
                use p256::ecdsa::signature::Signer;
                let key = p256::ecdsa::SigningKey::from_slice(private)
                    .map_err(|e| Error::Value(format!("Invalid P-256 private key: {e}")))?;
                let signature: p256::ecdsa::Signature = key.sign(input);
                Ok(signature.to_bytes().to_vec())
            }
            SignAlg::Es256K => {
                use k256::ecdsa::signature::Signer;
                let key = k256::ecdsa::SigningKey::from_slice(private)
                    .map_err(|e| Error::Value(format!("Invalid secp256k1 private key: {e}")))?;
                let signature: k256::ecdsa::Signature = key.sign(input);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    /// Verifies `signature` over `input` with the public key under `alg`.
    ///
    /// Returns false on any failure, including an `alg` that does not match the curve.
    pub fn verify(&self, alg: SignAlg, input: &[u8], signature: &[u8]) -> bool {
        if select_sign_alg(self).ok() != Some(alg) {
            return false;
        }
        match alg {
            SignAlg::EdDsa => {
                use ed25519_dalek::Verifier;
                let Ok(public) = <[u8; 32]>::try_from(self.public.as_slice()) else {
                    return false;
                };
                let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&public) else {
                    return false;
                };
                let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(input, &signature).is_ok()
            }
            SignAlg::Es256 => {
                use p256::ecdsa::signature::Verifier;
                let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.public) else {
                    return false;
                };
                let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(input, &signature).is_ok()
            }
            SignAlg::Es256K => {
                use k256::ecdsa::signature::Verifier;
                let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.public) else {
                    return false;
                };
                let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                let signature = signature.normalize_s().unwrap_or(signature);
                key.verify(input, &signature).is_ok()
            }
        }
    }
}

/// Picks the JWS algorithm for a key: `EdDSA` for Ed25519, `ES256` for P-256,
/// `ES256K` for secp256k1.
///
/// # Errors
///
/// `Unsupported` for any other curve.
pub fn select_sign_alg(key: &KeyMaterial) -> Result<SignAlg> {
    match key.curve {
        KeyCurve::Ed25519 => Ok(SignAlg::EdDsa),
        KeyCurve::P256 => Ok(SignAlg::Es256),
        KeyCurve::Secp256k1 => Ok(SignAlg::Es256K),
        other => Err(Error::Unsupported(format!(
            "No signature algorithm for curve {other}"
        ))),
    }
}

fn curve_for_type(type_: &VerificationMethodType) -> Result<KeyCurve> {
    match type_ {
        VerificationMethodType::Ed25519VerificationKey2018
        | VerificationMethodType::Ed25519VerificationKey2020 => Ok(KeyCurve::Ed25519),
        VerificationMethodType::X25519KeyAgreementKey2019
        | VerificationMethodType::X25519KeyAgreementKey2020 => Ok(KeyCurve::X25519),
        VerificationMethodType::EcdsaSecp256k1VerificationKey2019 => Ok(KeyCurve::Secp256k1),
        other => Err(Error::Unsupported(format!(
            "Base58 material is not supported for {other:?}"
        ))),
    }
}

fn normalize_public(curve: KeyCurve, public: &[u8]) -> Result<Vec<u8>> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let invalid = |e: &dyn std::fmt::Display| Error::Value(format!("Invalid {curve} public key: {e}"));
    match curve {
        KeyCurve::Ed25519 | KeyCurve::X25519 => {
            if public.len() != 32 {
                return Err(Error::Value(format!("{curve} public key must be 32 bytes")));
            }
            Ok(public.to_vec())
        }
        KeyCurve::P256 => p256::PublicKey::from_sec1_bytes(public)
            .map(|key| key.to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
        KeyCurve::P384 => p384::PublicKey::from_sec1_bytes(public)
            .map(|key| key.to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
        KeyCurve::Secp256k1 => k256::PublicKey::from_sec1_bytes(public)
            .map(|key| key.to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
    }
}

fn public_from_private(curve: KeyCurve, private: &[u8]) -> Result<Vec<u8>> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let invalid = |e: &dyn std::fmt::Display| Error::Value(format!("Invalid {curve} private key: {e}"));
    let bytes32 = |private: &[u8]| -> Result<[u8; 32]> {
        private
            .try_into()
            .map_err(|_| Error::Value(format!("{curve} private key must be 32 bytes")))
    };
    match curve {
        KeyCurve::Ed25519 => {
            let seed = Zeroizing::new(bytes32(private)?);
            let key = ed25519_dalek::SigningKey::from_bytes(&seed);
            Ok(key.verifying_key().to_bytes().to_vec())
        }
        KeyCurve::X25519 => {
            let secret = x25519_dalek::StaticSecret::from(bytes32(private)?);
            Ok(x25519_dalek::PublicKey::from(&secret).as_bytes().to_vec())
        }
        KeyCurve::P256 => p256::SecretKey::from_slice(private)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
        KeyCurve::P384 => p384::SecretKey::from_slice(private)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
        KeyCurve::Secp256k1 => k256::SecretKey::from_slice(private)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec())
            .map_err(|e| invalid(&e)),
    }
}

/// Encodes a public key as a `z`-prefixed base58btc multibase string with its
/// multicodec prefix.
pub fn public_key_multibase(key: &KeyMaterial) -> Result<String> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let (prefix, body) = match key.curve {
        KeyCurve::Ed25519 => (ED25519_PUB, key.public.clone()),
        KeyCurve::X25519 => (X25519_PUB, key.public.clone()),
        KeyCurve::P256 => {
            let point = p256::PublicKey::from_sec1_bytes(&key.public)
                .map_err(|e| Error::Value(format!("Invalid P-256 public key: {e}")))?;
            (P256_PUB, point.to_encoded_point(true).as_bytes().to_vec())
        }
        KeyCurve::P384 => {
            let point = p384::PublicKey::from_sec1_bytes(&key.public)
                .map_err(|e| Error::Value(format!("Invalid P-384 public key: {e}")))?;
            (P384_PUB, point.to_encoded_point(true).as_bytes().to_vec())
        }
        KeyCurve::Secp256k1 => {
            let point = k256::PublicKey::from_sec1_bytes(&key.public)
                .map_err(|e| Error::Value(format!("Invalid secp256k1 public key: {e}")))?;
            (SECP256K1_PUB, point.to_encoded_point(true).as_bytes().to_vec())
        }
    };
    let mut bytes = prefix.to_vec();
    bytes.extend_from_slice(&body);
    Ok(multibase::encode(Base::Base58Btc, bytes))
}

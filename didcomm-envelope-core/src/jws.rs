//! JWS (JSON Web Signature) envelopes in general JSON serialization.
//!
//! Each signature carries a protected header `{typ, alg}` and an unprotected
//! header `{kid}`. The signing input is `protected + "." + payload`, both in
//! base64url form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, MalformedKind, Result};
use crate::keys::{select_sign_alg, KeyMaterial, SignAlg};
use crate::types::{SIGNED_TYP, SIGNED_TYP_SHORT};
use crate::utils::{b64_decode, b64_encode};

/// Protected header of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsProtectedHeader {
    /// Media type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Signature algorithm
    pub alg: SignAlg,
}

/// Unprotected header of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsSignatureHeader {
    /// Signer key ID
    pub kid: String,
}

/// One signature over the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsSignature {
    /// base64url protected header
    pub protected: String,
    /// base64url signature
    pub signature: String,
    /// Unprotected header
    pub header: JwsSignatureHeader,
}

/// A JWS with one or more signatures over one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsMessage {
    /// base64url payload
    pub payload: String,
    /// Signatures, in signing order
    pub signatures: Vec<JwsSignature>,
}

/// The bytes a signature covers.
pub(crate) fn signing_input(protected: &str, payload: &str) -> String {
    format!("{protected}.{payload}")
}

fn invalid(message: impl Into<String>) -> Error {
    Error::malformed_with(MalformedKind::InvalidMessage, message)
}

impl JwsSignature {
    /// Decodes the protected header.
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_message)` if it does not decode or names a
    /// media type other than the signed one.
    pub fn protected_header(&self) -> Result<JwsProtectedHeader> {
        let bytes = b64_decode(&self.protected)
            .map_err(|_| invalid("JWS protected header is not base64url"))?;
        let header: JwsProtectedHeader = serde_json::from_slice(&bytes)
            .map_err(|e| invalid(format!("invalid JWS protected header: {e}")))?;
        match header.typ.as_deref() {
            None | Some(SIGNED_TYP) | Some(SIGNED_TYP_SHORT) => Ok(header),
            Some(other) => Err(invalid(format!("invalid JWS typ `{other}`"))),
        }
    }
}

impl JwsMessage {
    /// Signs `payload` once per signer.
    ///
    /// # Errors
    ///
    /// `Unsupported` if a signer's curve has no signature algorithm; `Value`
    /// if a signer has no private key.
    pub fn build(payload: &[u8], signers: &[(&str, &KeyMaterial)]) -> Result<Self> {
        if signers.is_empty() {
            return Err(Error::Value("JWS needs at least one signer".to_string()));
        }
        let payload = b64_encode(payload);
        let signatures = signers
            .iter()
            .map(|(kid, key)| -> Result<JwsSignature> {
                let header = JwsProtectedHeader {
                    typ: Some(SIGNED_TYP.to_string()),
                    alg: select_sign_alg(key)?,
                };
                let protected = b64_encode(serde_json::to_vec(&header)?);
                let signature = key.sign(signing_input(&protected, &payload).as_bytes())?;
                Ok(JwsSignature {
                    protected,
                    signature: b64_encode(signature),
                    header: JwsSignatureHeader {
                        kid: kid.to_string(),
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            payload,
            signatures,
        })
    }

    /// Parses and structurally validates a JWS.
    ///
    /// The payload and signature strings are left encoded; they are covered
    /// by the signatures and checked in [`JwsMessage::verify_signature`].
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_message)` for missing fields, no signatures
    /// or undecodable protected headers.
    pub fn parse(value: &Value) -> Result<Self> {
        let message: JwsMessage = serde_json::from_value(value.clone())
            .map_err(|e| invalid(format!("invalid JWS: {e}")))?;
        if message.signatures.is_empty() {
            return Err(invalid("JWS has no signatures"));
        }
        for signature in &message.signatures {
            signature.protected_header()?;
        }
        Ok(message)
    }

    /// The decoded payload. Only meaningful once every signature verified.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        b64_decode(&self.payload).map_err(|_| invalid("JWS payload is not base64url"))
    }

    /// Verifies one signature with the signer's public key.
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_signature)` if the signature does not verify
    /// or the header algorithm does not match the key.
    pub fn verify_signature(&self, signature: &JwsSignature, key: &KeyMaterial) -> Result<SignAlg> {
        let header = signature.protected_header()?;
        let bytes = b64_decode(&signature.signature)
            .map_err(|_| Error::malformed(MalformedKind::InvalidSignature))?;
        let input = signing_input(&signature.protected, &self.payload);
        if key.verify(header.alg, input.as_bytes(), &bytes) {
            Ok(header.alg)
        } else {
            Err(Error::malformed(MalformedKind::InvalidSignature))
        }
    }
}

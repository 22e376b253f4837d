//! `from_prior`: signed DID rotation claims.
//!
//! A message sent from a new DID may carry a compact JWT, signed by a key of
//! the previous DID (`iss`), asserting that the sender now uses `sub`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Error, MalformedKind, Result};
use crate::jws::signing_input;
use crate::keys::{select_sign_alg, SignAlg};
use crate::resolvers::ResolversConfig;
use crate::utils::{b64_decode, b64_encode, did_from_did_url, is_did, is_did_url};

/// JWT `typ` of `from_prior` tokens.
const JWT_TYP: &str = "JWT";

/// The claim set of a `from_prior` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromPrior {
    /// The previous DID
    pub iss: String,
    /// The new DID
    pub sub: String,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// JWT ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    typ: Option<String>,
    alg: SignAlg,
    kid: String,
}

fn is_plain_did(value: &str) -> bool {
    is_did(value) && !value.contains('#')
}

fn invalid(message: impl Into<String>) -> Error {
    Error::malformed_with(MalformedKind::InvalidMessage, message)
}

impl FromPrior {
    /// Creates a claim that `sub` replaces `iss`.
    pub fn new(iss: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            iss: iss.into(),
            sub: sub.into(),
            aud: None,
            exp: None,
            nbf: None,
            iat: None,
            jti: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if !is_plain_did(&self.iss) {
            return Err(Error::Value(format!("`from_prior.iss` is not a DID: {}", self.iss)));
        }
        if !is_plain_did(&self.sub) {
            return Err(Error::Value(format!("`from_prior.sub` is not a DID: {}", self.sub)));
        }
        if self.iss == self.sub {
            return Err(Error::Value("`from_prior.iss` and `sub` must differ".to_string()));
        }
        Ok(())
    }

    /// Signs the claim with a key of `iss`.
    ///
    /// Returns the compact token and the kid of the signing key.
    ///
    /// # Arguments
    /// * `issuer_kid` - Signing key to use; must be a DID URL of `iss`. When
    ///   absent the key is selected as for signed messages.
    ///
    /// # Errors
    /// * `Error::Value` - If `iss`/`sub` are not distinct DIDs or `issuer_kid`
    ///   is not a DID URL of `iss`
    /// * Resolution errors from selecting the signing key
    pub async fn pack(
        &self,
        issuer_kid: Option<&str>,
        resolvers: &ResolversConfig,
    ) -> Result<(String, String)> {
        self.validate()?;
        if let Some(kid) = issuer_kid {
            if !is_did_url(kid) || did_from_did_url(kid) != self.iss {
                return Err(Error::Value(format!(
                    "`issuer_kid` {kid} is not a DID URL of {}",
                    self.iss
                )));
            }
        }

        let (kid, key) = resolvers
            .find_signing_key(issuer_kid.unwrap_or(&self.iss))
            .await?;
        let header = json!({
            "typ": JWT_TYP,
            "alg": select_sign_alg(&key)?,
            "kid": kid,
        });
        let header = b64_encode(serde_json::to_vec(&header)?);
        let claims = b64_encode(serde_json::to_vec(self)?);
        let input = signing_input(&header, &claims);
        let signature = b64_encode(key.sign(input.as_bytes())?);

        debug!("Signed from_prior for {} with {}", self.sub, kid);
        Ok((format!("{input}.{signature}"), kid))
    }

    /// Verifies a token and returns its claim set and the issuer kid.
    ///
    /// # Errors
    /// * `MalformedMessage(invalid_message)` - For a structurally invalid token,
    ///   a kid outside `iss`, or `iss == sub`
    /// * `MalformedMessage(invalid_signature)` - If the signature does not verify
    pub async fn unpack(token: &str, resolvers: &ResolversConfig) -> Result<(FromPrior, String)> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(invalid("from_prior is not a compact JWT"));
        };

        let header: JwtHeader = b64_decode(header_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| invalid("from_prior header is invalid"))?;
        if header.typ.as_deref().is_some_and(|typ| typ != JWT_TYP) {
            return Err(invalid("from_prior header typ is not JWT"));
        }
        let claim: FromPrior = b64_decode(claims_b64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| invalid("from_prior claims are invalid"))?;
        let signature =
            b64_decode(signature_b64).map_err(|_| invalid("from_prior signature is not base64url"))?;

        claim
            .validate()
            .map_err(|e| invalid(format!("from_prior claims are invalid: {e}")))?;
        if !is_did_url(&header.kid) || did_from_did_url(&header.kid) != claim.iss {
            return Err(invalid("from_prior kid does not belong to iss"));
        }

        let key = resolvers.resolve_public_key(&header.kid).await?;
        let input = signing_input(header_b64, claims_b64);
        if !key.verify(header.alg, input.as_bytes(), &signature) {
            return Err(Error::malformed(MalformedKind::InvalidSignature));
        }
        Ok((claim, header.kid))
    }
}

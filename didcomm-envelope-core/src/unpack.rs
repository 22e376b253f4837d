//! Message unpacking.
//!
//! A received envelope is peeled one layer at a time: each JSON value is
//! probed into an [`Envelope`], the cryptographic step of a JWE or JWS layer
//! is reversed, and the result is probed again until a plaintext message
//! remains. Provenance is accumulated in [`UnpackMetadata`] along the way.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::error::{Error, MalformedKind, Result};
use crate::forward::ForwardMessage;
use crate::from_prior::FromPrior;
use crate::jwe::{
    calculate_apv, resolve_cek_for_recipient, AnonCryptAlg, AuthCryptAlg, JweMessage,
    KeyAgreementAlgorithm,
};
use crate::jws::JwsMessage;
use crate::keys::{KeyMaterial, SignAlg};
use crate::pack::key_agreement_key;
use crate::resolvers::ResolversConfig;
use crate::types::{FromPriorField, Message};
use crate::utils::{did_from_did_url, is_did_url};

/// Provenance of an unpacked message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnpackMetadata {
    /// At least one encryption layer was removed
    pub encrypted: bool,
    /// The sender is authenticated by authcrypt or a signature
    pub authenticated: bool,
    /// The message was signed
    pub non_repudiation: bool,
    /// An anoncrypt layer was removed
    pub anonymous_sender: bool,
    /// Sender key agreement key of the authcrypt layer
    pub encrypted_from_kid: Option<String>,
    /// Recipient kids of the last encryption layer
    pub encrypted_to_kids: Option<Vec<String>>,
    /// First signer kid
    pub sign_from: Option<String>,
    /// All signer kids, in signature order
    pub signed_by_kids: Option<Vec<String>>,
    /// Algorithm of the first signature
    pub sign_alg: Option<SignAlg>,
    /// The JWS as received, for later non-repudiation checks
    pub signed_message: Option<String>,
    /// Key that signed the `from_prior` token
    pub from_prior_issuer_kid: Option<String>,
    /// The verified `from_prior` claim set
    pub from_prior: Option<FromPrior>,
    /// Algorithms of the authcrypt layer
    pub enc_alg_auth: Option<AuthCryptAlg>,
    /// Algorithms of the anoncrypt layer
    pub enc_alg_anon: Option<AnonCryptAlg>,
    /// Envelope carried by a forward message, for the caller to route on
    pub forwarded_msg: Option<Value>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::malformed_with(MalformedKind::InvalidMessage, message)
}

fn parse_layer(bytes: &[u8], layer: &str) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| invalid(format!("{layer} payload is not JSON: {e}")))
}

/// The sender kid of an ECDH-1PU header, from `skid` or the decoded `apu`.
fn authcrypt_sender_kid(skid: Option<&str>, apu: &[u8]) -> Result<String> {
    let from_apu = (!apu.is_empty())
        .then(|| String::from_utf8(apu.to_vec()))
        .transpose()
        .map_err(|_| invalid("apu is not a UTF-8 key ID"))?;
    let kid = match (skid, from_apu) {
        (Some(skid), Some(apu)) if skid != apu => {
            return Err(invalid("skid and apu name different senders"))
        }
        (Some(skid), _) => skid.to_string(),
        (None, Some(apu)) => apu,
        (None, None) => return Err(invalid("ECDH-1PU envelope names no sender")),
    };
    if !is_did_url(&kid) {
        return Err(invalid(format!("sender kid {kid} is not a DID URL")));
    }
    Ok(kid)
}

async fn unpack_jwe(
    jwe: &JweMessage,
    resolvers: &ResolversConfig,
    metadata: &mut UnpackMetadata,
) -> Result<(Value, Option<String>)> {
    let header = jwe.protected_header()?;
    let kids = jwe.recipient_kids();
    if header.apv != calculate_apv(&kids) {
        return Err(invalid("apv does not match the recipient kids"));
    }

    let known = resolvers.find_secrets(&kids).await?;
    let Some(kid) = known.first() else {
        return Err(Error::SecretNotFound(format!(
            "no secret for any recipient of {}",
            kids.join(", ")
        )));
    };
    let own = resolvers.get_secret_key(kid).await?;

    let (sender_kid, sender): (Option<String>, Option<KeyMaterial>) = match header.alg {
        KeyAgreementAlgorithm::EcdhEsA256kw => {
            metadata.anonymous_sender = true;
            metadata.enc_alg_anon = Some(AnonCryptAlg::from_enc(header.enc));
            (None, None)
        }
        KeyAgreementAlgorithm::Ecdh1puA256kw => {
            let alg = AuthCryptAlg::from_enc(header.enc).ok_or_else(|| {
                Error::Unsupported(format!("{} is not allowed with ECDH-1PU", header.enc))
            })?;
            let apu = header
                .apu_bytes()
                .map_err(|_| invalid("apu is not base64url"))?;
            let sender_kid = authcrypt_sender_kid(header.skid.as_deref(), &apu)?;
            let doc = resolvers.resolve_doc(did_from_did_url(&sender_kid)).await?;
            let sender = key_agreement_key(&doc, &sender_kid)?;
            metadata.authenticated = true;
            metadata.enc_alg_auth = Some(alg);
            metadata.encrypted_from_kid = Some(sender_kid.clone());
            (Some(sender_kid), Some(sender))
        }
    };

    let wrapped = jwe
        .encrypted_key_for(kid)
        .ok_or_else(|| invalid(format!("no encrypted key for {kid}")))?;
    let plaintext = resolve_cek_for_recipient(&header, &own, sender.as_ref(), &wrapped)
        .and_then(|cek| jwe.decrypt(&cek))
        .map_err(|e| {
            debug!("Decryption for {kid} failed: {e}");
            Error::malformed(MalformedKind::CanNotDecrypt)
        })?;

    metadata.encrypted = true;
    metadata.encrypted_to_kids = Some(kids);
    debug!("Decrypted {} layer for {kid}", header.alg);
    Ok((parse_layer(&plaintext, "JWE")?, sender_kid))
}

async fn unpack_jws(
    jws: &JwsMessage,
    resolvers: &ResolversConfig,
    metadata: &mut UnpackMetadata,
) -> Result<Value> {
    let mut signed_by = Vec::with_capacity(jws.signatures.len());
    let mut first_alg = None;
    for signature in &jws.signatures {
        let kid = &signature.header.kid;
        if !is_did_url(kid) {
            return Err(invalid(format!("signer kid {kid} is not a DID URL")));
        }
        let doc = resolvers.resolve_doc(did_from_did_url(kid)).await?;
        if !doc.authentication_ids().contains(&kid.as_str()) {
            return Err(Error::malformed_with(
                MalformedKind::InvalidSignature,
                format!("{kid} is not an authentication key"),
            ));
        }
        let method = doc
            .find_method(kid)
            .ok_or_else(|| Error::DidUrlNotFound(kid.clone()))?;
        let key = KeyMaterial::from_verification_method(method)?;
        let alg = jws.verify_signature(signature, &key)?;
        first_alg.get_or_insert(alg);
        signed_by.push(kid.clone());
    }

    metadata.authenticated = true;
    metadata.non_repudiation = true;
    metadata.sign_from = signed_by.first().cloned();
    metadata.sign_alg = first_alg;
    metadata.signed_by_kids = Some(signed_by);
    metadata.signed_message = Some(serde_json::to_string(jws)?);
    parse_layer(&jws.payload_bytes()?, "JWS")
}

async fn unpack_plaintext(
    value: Value,
    authcrypt_sender: Option<&str>,
    resolvers: &ResolversConfig,
    metadata: &mut UnpackMetadata,
) -> Result<Message> {
    let mut message = Message::from_value(value)?;

    if let Some(sender_kid) = authcrypt_sender {
        let from = message.from.as_deref().map(did_from_did_url);
        if from != Some(did_from_did_url(sender_kid)) {
            return Err(invalid(format!(
                "plaintext `from` does not match the encrypting sender {sender_kid}"
            )));
        }
    }

    if let Some(FromPriorField::Token(token)) = &message.from_prior {
        let (claim, issuer_kid) = FromPrior::unpack(token, resolvers).await?;
        if let Some(from) = &message.from {
            if did_from_did_url(from) != claim.sub {
                return Err(invalid("`from_prior.sub` does not match `from`"));
            }
        }
        message.from_prior = Some(FromPriorField::Claim(claim.clone()));
        metadata.from_prior_issuer_kid = Some(issuer_kid);
        metadata.from_prior = Some(claim);
    }

    if let Some(forward) = ForwardMessage::try_parse(&message)? {
        debug!("Message {} is a forward to {}", message.id, forward.next);
        metadata.forwarded_msg = Some(forward.forwarded_msg);
    }
    Ok(message)
}

/// Unpacks a received envelope of any shape into its plaintext message.
///
/// Encryption and signature layers are removed in the order found, to any
/// depth. A forward message is returned as is; the envelope it carries is in
/// [`UnpackMetadata::forwarded_msg`].
///
/// # Errors
/// * `MalformedMessage(invalid_message)` - For input that is not JSON, an
///   invalid envelope structure, an `apv` that does not match the recipients,
///   or a plaintext `from` that differs from the authcrypt sender
/// * `MalformedMessage(can_not_decrypt)` - If a JWE layer cannot be decrypted
/// * `MalformedMessage(invalid_signature)` - If any JWS signature fails
/// * `MalformedMessage(invalid_plaintext)` - If the innermost message is invalid
/// * `MalformedMessage(not_supported_fwd_protocol)` - For an unknown forward version
/// * `SecretNotFound` - If no recipient of a JWE layer has a known secret
/// * Resolution errors for senders and signers
pub async fn unpack(packed: &str, resolvers: &ResolversConfig) -> Result<(Message, UnpackMetadata)> {
    let mut value: Value =
        serde_json::from_str(packed).map_err(|e| invalid(format!("message is not JSON: {e}")))?;
    let mut metadata = UnpackMetadata::default();
    let mut authcrypt_sender = None;

    loop {
        let envelope = Envelope::probe(value)?;
        debug!("Unpacking {} layer", envelope.kind());
        value = match envelope {
            Envelope::Jwe(jwe) => {
                let (inner, sender) = unpack_jwe(&jwe, resolvers, &mut metadata).await?;
                if sender.is_some() {
                    authcrypt_sender = sender;
                }
                inner
            }
            Envelope::Jws(jws) => unpack_jws(&jws, resolvers, &mut metadata).await?,
            Envelope::Plaintext(plaintext) => {
                let message = unpack_plaintext(
                    plaintext,
                    authcrypt_sender.as_deref(),
                    resolvers,
                    &mut metadata,
                )
                .await?;
                info!(
                    "Unpacked message {} (encrypted: {}, authenticated: {}, signed: {})",
                    message.id, metadata.encrypted, metadata.authenticated, metadata.non_repudiation
                );
                return Ok((message, metadata));
            }
            Envelope::Unrecognized(_) => {
                return Err(invalid("message is not a JSON object"));
            }
        };
    }
}

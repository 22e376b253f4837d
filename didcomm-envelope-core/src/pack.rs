//! Message packing.
//!
//! This module provides the three ways a `DIDComm` message is put on the wire:
//! [`pack_plaintext`], [`pack_signed`] (JWS) and [`pack_encrypted`] (JWE,
//! optionally signed first, sender-protected and forward-wrapped).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::did::{DidCommMessagingService, DidDoc};
use crate::error::{Error, Result};
use crate::forward::wrap_in_forward;
use crate::jwe::{
    derive_anoncrypt_cek, derive_authcrypt_cek, AnonCryptAlg, AuthCryptAlg, JweHeader, JweMessage,
};
use crate::jws::JwsMessage;
use crate::keys::KeyMaterial;
use crate::resolvers::ResolversConfig;
use crate::types::{FromPriorField, Message};
use crate::utils::{did_from_did_url, did_or_url, validate_did};

/// Options for [`pack_encrypted`].
#[derive(Debug, Clone, PartialEq)]
pub struct PackEncryptedConfig {
    /// Algorithms used when `from` is given
    pub enc_alg_auth: AuthCryptAlg,
    /// Algorithms used for anonymous encryption, sender protection and forwards
    pub enc_alg_anon: AnonCryptAlg,
    /// Wrap the authcrypt envelope in anoncrypt to hide the sender kid
    pub protect_sender_id: bool,
    /// Wrap the envelope in forward messages for the recipient's mediators
    pub forward: bool,
    /// Extra headers for generated forward messages
    pub forward_headers: Option<BTreeMap<String, Value>>,
    /// ID of the recipient's messaging service to use
    pub messaging_service: Option<String>,
}

impl Default for PackEncryptedConfig {
    fn default() -> Self {
        Self {
            enc_alg_auth: AuthCryptAlg::default(),
            enc_alg_anon: AnonCryptAlg::default(),
            protect_sender_id: false,
            forward: true,
            forward_headers: None,
            messaging_service: None,
        }
    }
}

/// Result details of [`pack_plaintext`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackPlaintextMetadata {
    /// Key that signed the `from_prior` claim
    pub from_prior_issuer_kid: Option<String>,
}

/// Result details of [`pack_signed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSignedMetadata {
    /// Key that signed the message
    pub sign_from_kid: String,
    /// Key that signed the `from_prior` claim
    pub from_prior_issuer_kid: Option<String>,
}

/// The messaging service a message was packed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingServiceMetadata {
    /// Service ID
    pub id: String,
    /// Endpoint to deliver the packed message to
    pub service_endpoint: String,
}

/// Result details of [`pack_encrypted`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackEncryptedMetadata {
    /// Service the message was prepared for, if one was found
    pub messaging_service: Option<MessagingServiceMetadata>,
    /// Sender key agreement key (authcrypt only)
    pub from_kid: Option<String>,
    /// Key that signed the message before encryption
    pub sign_from_kid: Option<String>,
    /// Recipient key agreement keys
    pub to_kids: Vec<String>,
    /// Key that signed the `from_prior` claim
    pub from_prior_issuer_kid: Option<String>,
}

/// Validates the message and signs a `from_prior` claim object into a token.
async fn prepare_message(
    message: &Message,
    resolvers: &ResolversConfig,
) -> Result<(Message, Option<String>)> {
    message.validate()?;
    let mut message = message.clone();
    let mut issuer_kid = None;
    if let Some(FromPriorField::Claim(claim)) = &message.from_prior {
        if let Some(from) = &message.from {
            if did_from_did_url(from) != claim.sub {
                return Err(Error::Value(format!(
                    "`from_prior.sub` {} differs from `from` {from}",
                    claim.sub
                )));
            }
        }
        let (token, kid) = claim.pack(None, resolvers).await?;
        message.from_prior = Some(FromPriorField::Token(token));
        issuer_kid = Some(kid);
    }
    Ok((message, issuer_kid))
}

/// Produces a plaintext message.
///
/// A `from_prior` claim object is signed and replaced by its token.
///
/// # Errors
///
/// `Value` if the message fails validation; resolution errors while signing
/// `from_prior`.
pub async fn pack_plaintext(
    message: &Message,
    resolvers: &ResolversConfig,
) -> Result<(String, PackPlaintextMetadata)> {
    let (message, from_prior_issuer_kid) = prepare_message(message, resolvers).await?;
    let packed = serde_json::to_string(&message)?;
    debug!("Packed plaintext message {}", message.id);
    Ok((
        packed,
        PackPlaintextMetadata {
            from_prior_issuer_kid,
        },
    ))
}

async fn sign(message: &Message, sign_by: &str, resolvers: &ResolversConfig) -> Result<(String, String)> {
    let (kid, key) = resolvers.find_signing_key(sign_by).await?;
    let payload = serde_json::to_vec(message)?;
    let jws = JwsMessage::build(&payload, &[(&kid, &key)])?;
    Ok((serde_json::to_string(&jws)?, kid))
}

/// Produces a signed (JWS) message.
///
/// # Arguments
/// * `sign_by` - DID or DID URL of the signer. A DID URL must be one of the
///   signer's authentication keys.
///
/// # Errors
/// * `Error::Value` - If `sign_by` is not a DID or DID URL
/// * `Error::DidUrlNotFound` - If `sign_by` is not an authentication key
/// * `Error::SecretNotFound` - If no signing secret is available
pub async fn pack_signed(
    message: &Message,
    sign_by: &str,
    resolvers: &ResolversConfig,
) -> Result<(String, PackSignedMetadata)> {
    validate_did("sign_by", sign_by)?;
    let (message, from_prior_issuer_kid) = prepare_message(message, resolvers).await?;
    let (packed, sign_from_kid) = sign(&message, sign_by, resolvers).await?;
    info!("Packed signed message {} with {}", message.id, sign_from_kid);
    Ok((
        packed,
        PackSignedMetadata {
            sign_from_kid,
            from_prior_issuer_kid,
        },
    ))
}

/// Extracts a key agreement public key of `doc`.
///
/// # Errors
///
/// `DidUrlNotFound` if `kid` is not in the document; `IncompatibleCrypto` if
/// it exists but is not a key agreement key on an ECDH curve.
pub(crate) fn key_agreement_key(doc: &DidDoc, kid: &str) -> Result<KeyMaterial> {
    let Some(method) = doc.find_method(kid) else {
        return Err(Error::DidUrlNotFound(kid.to_string()));
    };
    if !doc.key_agreement_ids().contains(&kid) {
        return Err(Error::IncompatibleCrypto(format!(
            "{kid} is not a key agreement key"
        )));
    }
    let key = KeyMaterial::from_verification_method(method)?;
    if key.ecdh_curve().is_none() {
        return Err(Error::IncompatibleCrypto(format!(
            "{kid} is a {} key and cannot be used for key agreement",
            key.curve()
        )));
    }
    Ok(key)
}

/// Resolves the key agreement keys `to` names in `doc`.
///
/// A DID URL narrows to that key. A bare DID yields every usable key
/// agreement key in document order.
pub(crate) fn recipient_keys(doc: &DidDoc, to: &str) -> Result<Vec<(String, KeyMaterial)>> {
    if let (_, Some(kid)) = did_or_url(to) {
        return Ok(vec![(kid.to_string(), key_agreement_key(doc, kid)?)]);
    }
    let ids = doc.key_agreement_ids();
    if ids.is_empty() {
        return Err(Error::DidUrlNotFound(format!("{} has no key agreement keys", doc.id)));
    }
    let mut keys = Vec::with_capacity(ids.len());
    for kid in ids {
        match key_agreement_key(doc, kid) {
            Ok(key) => keys.push((kid.to_string(), key)),
            Err(e) => debug!("Skipping key agreement key {kid}: {e}"),
        }
    }
    if keys.is_empty() {
        return Err(Error::IncompatibleCrypto(format!(
            "{} has no usable key agreement keys",
            doc.id
        )));
    }
    Ok(keys)
}

/// Anonymously encrypts `payload` to the recipients sharing the first
/// recipient's curve. Returns the JWE and the kids it was encrypted to.
pub(crate) fn anoncrypt(
    payload: &[u8],
    recipients: &[(String, KeyMaterial)],
    alg: AnonCryptAlg,
) -> Result<(String, Vec<String>)> {
    let curve = recipients
        .first()
        .and_then(|(_, key)| key.ecdh_curve())
        .ok_or_else(|| Error::IncompatibleCrypto("no key agreement recipient".to_string()))?;
    let selected: Vec<(&str, &KeyMaterial)> = recipients
        .iter()
        .filter(|(_, key)| key.ecdh_curve() == Some(curve))
        .map(|(kid, key)| (kid.as_str(), key))
        .collect();

    let derivation = derive_anoncrypt_cek(alg, &selected)?;
    let header = JweHeader::new_anoncrypt(alg.algs().enc, derivation.epk, derivation.apv);
    let jwe = JweMessage::build(&header, &derivation.cek, &derivation.encrypted_keys, payload)?;
    let kids = selected.iter().map(|(kid, _)| kid.to_string()).collect();
    Ok((serde_json::to_string(&jwe)?, kids))
}

fn authcrypt(
    payload: &[u8],
    sender_kid: &str,
    sender: &KeyMaterial,
    recipients: &[(&str, &KeyMaterial)],
    alg: AuthCryptAlg,
) -> Result<String> {
    let derivation = derive_authcrypt_cek(alg, sender_kid, sender, recipients)?;
    let header = JweHeader::new_authcrypt(
        alg.algs().enc,
        derivation.epk,
        sender_kid.to_string(),
        derivation.apu.unwrap_or_default(),
        derivation.apv,
    );
    let jwe = JweMessage::build(&header, &derivation.cek, &derivation.encrypted_keys, payload)?;
    Ok(serde_json::to_string(&jwe)?)
}

/// Finds the sender key agreement key to use with `recipients`.
///
/// Candidates are the sender's key agreement keys with a known secret, in
/// document order; the first one sharing a curve with a recipient wins.
async fn select_sender_key(
    from: &str,
    recipients: &[(String, KeyMaterial)],
    resolvers: &ResolversConfig,
) -> Result<(String, KeyMaterial)> {
    let (from_did, from_kid) = did_or_url(from);
    let doc = resolvers.resolve_doc(from_did).await?;
    let candidates: Vec<(String, KeyMaterial)> = match from_kid {
        Some(kid) => vec![(kid.to_string(), key_agreement_key(&doc, kid)?)],
        None => {
            let ids: Vec<String> = doc.key_agreement_ids().into_iter().map(str::to_string).collect();
            let known = resolvers.find_secrets(&ids).await?;
            if known.is_empty() {
                return Err(Error::SecretNotFound(format!(
                    "no secret for the key agreement keys of {from_did}"
                )));
            }
            known
                .into_iter()
                .filter_map(|kid| key_agreement_key(&doc, &kid).ok().map(|key| (kid, key)))
                .collect()
        }
    };

    let kid = candidates
        .iter()
        .find(|(_, sender)| {
            recipients
                .iter()
                .any(|(_, recipient)| recipient.ecdh_curve() == sender.ecdh_curve())
        })
        .map(|(kid, _)| kid.clone())
        .ok_or_else(|| {
            Error::IncompatibleCrypto(format!(
                "no key agreement key of {from} shares a curve with the recipient"
            ))
        })?;
    let secret = resolvers.get_secret_key(&kid).await?;
    Ok((kid, secret))
}

fn messaging_service(
    doc: &DidDoc,
    config: &PackEncryptedConfig,
) -> Result<Option<DidCommMessagingService>> {
    match &config.messaging_service {
        Some(id) => doc
            .find_didcomm_service(Some(id))
            .map(Some)
            .ok_or_else(|| Error::Value(format!("messaging service {id} not found in {}", doc.id))),
        None => Ok(doc.find_didcomm_service(None)),
    }
}

/// Produces an encrypted (JWE) message.
///
/// Recipient and sender keys are selected before anything is signed. The
/// message is signed when `sign_by` is given, then encrypted with authcrypt
/// when `from` is given or anoncrypt otherwise. With `protect_sender_id` the
/// authcrypt envelope is anoncrypted again to the same recipients. Finally it
/// is wrapped in forward messages for each routing key of the recipient's
/// messaging service.
///
/// # Arguments
/// * `to` - Recipient DID or key agreement DID URL; its DID must be in `message.to`
/// * `from` - Sender DID or key agreement DID URL; its DID must equal `message.from`
/// * `sign_by` - Signer DID or authentication DID URL
///
/// # Errors
/// * `Error::Value` - For invalid arguments or a message inconsistent with them
/// * `Error::IncompatibleCrypto` - If no sender key shares a curve with the
///   recipient, or a DID URL is not a key agreement key
/// * Resolution errors for the DIDs and secrets involved
pub async fn pack_encrypted(
    message: &Message,
    to: &str,
    from: Option<&str>,
    sign_by: Option<&str>,
    resolvers: &ResolversConfig,
    config: &PackEncryptedConfig,
) -> Result<(String, PackEncryptedMetadata)> {
    validate_did("to", to)?;
    if let Some(from) = from {
        validate_did("from", from)?;
    }
    if let Some(sign_by) = sign_by {
        validate_did("sign_by", sign_by)?;
    }

    let to_did = did_from_did_url(to);
    if !message
        .to
        .iter()
        .flatten()
        .any(|recipient| did_from_did_url(recipient) == to_did)
    {
        return Err(Error::Value(format!("`message.to` does not contain {to_did}")));
    }
    if let Some(from) = from {
        if message.from.as_deref().map(did_from_did_url) != Some(did_from_did_url(from)) {
            return Err(Error::Value(format!(
                "`message.from` does not match {}",
                did_from_did_url(from)
            )));
        }
    }

    let to_doc = resolvers.resolve_doc(to_did).await?;
    let recipients = recipient_keys(&to_doc, to)?;
    let sender = match from {
        Some(from) => Some(select_sender_key(from, &recipients, resolvers).await?),
        None => None,
    };

    let (message, from_prior_issuer_kid) = prepare_message(message, resolvers).await?;
    let (payload, sign_from_kid) = match sign_by {
        Some(sign_by) => {
            let (jws, kid) = sign(&message, sign_by, resolvers).await?;
            (jws, Some(kid))
        }
        None => (serde_json::to_string(&message)?, None),
    };

    let (mut packed, from_kid, to_kids) = match sender {
        Some((sender_kid, sender)) => {
            let selected: Vec<(&str, &KeyMaterial)> = recipients
                .iter()
                .filter(|(_, key)| key.ecdh_curve() == sender.ecdh_curve())
                .map(|(kid, key)| (kid.as_str(), key))
                .collect();
            let to_kids: Vec<String> = selected.iter().map(|(kid, _)| kid.to_string()).collect();
            let mut packed = authcrypt(
                payload.as_bytes(),
                &sender_kid,
                &sender,
                &selected,
                config.enc_alg_auth,
            )?;
            if config.protect_sender_id {
                let owned: Vec<(String, KeyMaterial)> = recipients
                    .iter()
                    .filter(|(kid, _)| to_kids.contains(kid))
                    .cloned()
                    .collect();
                packed = anoncrypt(packed.as_bytes(), &owned, config.enc_alg_anon)?.0;
            }
            (packed, Some(sender_kid), to_kids)
        }
        None => {
            let (packed, to_kids) = anoncrypt(payload.as_bytes(), &recipients, config.enc_alg_anon)?;
            (packed, None, to_kids)
        }
    };

    let mut service_metadata = None;
    if config.forward {
        if let Some(service) = messaging_service(&to_doc, config)? {
            if !service.routing_keys.is_empty() {
                packed = wrap_in_forward(
                    &packed,
                    config.forward_headers.as_ref(),
                    to,
                    &service.routing_keys,
                    config.enc_alg_anon,
                    resolvers,
                )
                .await?;
            }
            service_metadata = Some(MessagingServiceMetadata {
                id: service.id,
                service_endpoint: service.uri,
            });
        }
    }

    info!(
        "Packed encrypted message {} for {} ({})",
        message.id,
        to_kids.join(", "),
        if from_kid.is_some() { "authcrypt" } else { "anoncrypt" }
    );
    Ok((
        packed,
        PackEncryptedMetadata {
            messaging_service: service_metadata,
            from_kid,
            sign_from_kid,
            to_kids,
            from_prior_issuer_kid,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn message() -> Message {
        Message::new("https://example.com/protocols/lets_do_lunch/1.0/proposal", json!({"a": 1}))
            .from(fixtures::ALICE_DID)
            .to([fixtures::BOB_DID])
    }

    #[test]
    fn test_default_config() {
        let config = PackEncryptedConfig::default();
        assert!(config.forward);
        assert!(!config.protect_sender_id);
        assert_eq!(config.enc_alg_anon, AnonCryptAlg::Xc20pEcdhEsA256kw);
        assert_eq!(config.enc_alg_auth, AuthCryptAlg::A256cbcHs512Ecdh1puA256kw);
    }

    #[tokio::test]
    async fn test_pack_encrypted_argument_validation() {
        let resolvers = fixtures::resolvers();
        let config = PackEncryptedConfig::default();

        let err = pack_encrypted(&message(), "bob", None, None, &resolvers, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Value(_)));

        let err = pack_encrypted(&message(), fixtures::CHARLIE_DID, None, None, &resolvers, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Value(_)));

        let err = pack_encrypted(
            &message(),
            fixtures::BOB_DID,
            Some(fixtures::CHARLIE_DID),
            None,
            &resolvers,
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Value(_)));

        let err = pack_encrypted(
            &message(),
            fixtures::BOB_DID,
            None,
            Some("not a did"),
            &resolvers,
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Value(_)));
    }

    #[tokio::test]
    async fn test_pack_encrypted_key_selection() {
        let resolvers = fixtures::resolvers();
        let config = PackEncryptedConfig {
            forward: false,
            ..PackEncryptedConfig::default()
        };

        let (_, metadata) = pack_encrypted(
            &message(),
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(metadata.from_kid.as_deref(), Some(fixtures::ALICE_X25519_KID));
        assert_eq!(metadata.to_kids, vec![fixtures::BOB_X25519_KID.to_string()]);

        // A P-256 recipient key forces the P-256 sender key.
        let (_, metadata) = pack_encrypted(
            &message(),
            fixtures::BOB_P256_KID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(metadata.from_kid.as_deref(), Some(fixtures::ALICE_P256_KID));
        assert_eq!(metadata.to_kids, vec![fixtures::BOB_P256_KID.to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_recipient_kid() {
        let resolvers = fixtures::resolvers();
        let err = pack_encrypted(
            &message(),
            "did:example:bob#missing",
            None,
            None,
            &resolvers,
            &PackEncryptedConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::DidUrlNotFound(_)));
    }

    #[tokio::test]
    async fn test_pack_signed_requires_authentication_key() {
        let resolvers = fixtures::resolvers();
        let err = pack_signed(&message(), fixtures::ALICE_X25519_KID, &resolvers)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DidUrlNotFound(_)));

        let err = pack_signed(&message(), "alice", &resolvers).await.unwrap_err();
        assert!(matches!(err, Error::Value(_)));

        let (_, metadata) = pack_signed(&message(), fixtures::ALICE_DID, &resolvers)
            .await
            .unwrap();
        assert_eq!(metadata.sign_from_kid, fixtures::ALICE_ED25519_KID);
    }

    #[tokio::test]
    async fn test_pack_plaintext_signs_from_prior() {
        let resolvers = fixtures::resolvers();
        let message = message().from_prior(crate::from_prior::FromPrior::new(
            fixtures::CHARLIE_DID,
            fixtures::ALICE_DID,
        ));
        let (packed, metadata) = pack_plaintext(&message, &resolvers).await.unwrap();
        assert_eq!(
            metadata.from_prior_issuer_kid.as_deref(),
            Some(fixtures::CHARLIE_AUTH_KID)
        );
        let value: Value = serde_json::from_str(&packed).unwrap();
        assert!(value["from_prior"].is_string());

        let mismatched = message.from(fixtures::BOB_DID).to([fixtures::ALICE_DID]);
        assert!(matches!(
            pack_plaintext(&mismatched, &resolvers).await,
            Err(Error::Value(_))
        ));
    }
}

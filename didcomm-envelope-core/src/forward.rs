//! Routing protocol 2.0 forward messages.
//!
//! On pack, an encrypted message for a recipient behind mediators is wrapped
//! once per routing key. On unpack, a forward message is recognised and handed
//! back to the caller; it is never unwrapped further here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Error, MalformedKind, Result};
use crate::jwe::AnonCryptAlg;
use crate::pack::{anoncrypt, recipient_keys};
use crate::resolvers::ResolversConfig;
use crate::types::{Attachment, AttachmentData, Message};
use crate::utils::did_from_did_url;

/// Message type of routing 2.0 forward messages.
pub const FORWARD_MSG_TYPE: &str = "https://didcomm.org/routing/2.0/forward";

static FORWARD_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://didcomm\.org/routing/[^/]+/forward$")
        .expect("Failed to compile FORWARD_TYPE_REGEX")
});

/// A received forward message.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardMessage {
    /// The forward message itself
    pub message: Message,
    /// DID or DID URL of the next hop
    pub next: String,
    /// The envelope to pass on
    pub forwarded_msg: Value,
}

impl ForwardMessage {
    /// Recognises a forward message.
    ///
    /// Returns `Ok(None)` for any other message type.
    ///
    /// # Errors
    ///
    /// `MalformedMessage(not_supported_fwd_protocol)` for another routing
    /// protocol version; `MalformedMessage(invalid_message)` for a 2.0 forward
    /// without `next` or a JSON attachment.
    pub fn try_parse(message: &Message) -> Result<Option<Self>> {
        if message.type_ != FORWARD_MSG_TYPE {
            if FORWARD_TYPE_REGEX.is_match(&message.type_) {
                return Err(Error::malformed_with(
                    MalformedKind::NotSupportedFwdProtocol,
                    format!("unsupported forward protocol `{}`", message.type_),
                ));
            }
            return Ok(None);
        }

        let next = message
            .body
            .get("next")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::malformed_with(MalformedKind::InvalidMessage, "forward body has no `next`")
            })?;
        let forwarded_msg = message
            .attachments
            .as_deref()
            .and_then(<[Attachment]>::first)
            .and_then(|attachment| match &attachment.data {
                AttachmentData::Json { json, .. } => Some(json.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                Error::malformed_with(
                    MalformedKind::InvalidMessage,
                    "forward has no JSON attachment",
                )
            })?;

        Ok(Some(Self {
            message: message.clone(),
            next: next.to_string(),
            forwarded_msg,
        }))
    }
}

/// Fields a forward header may not override.
const RESERVED_FORWARD_FIELDS: &[&str] = &["id", "typ", "type", "body", "attachments"];

fn build_forward(
    envelope: &str,
    next: &str,
    headers: Option<&BTreeMap<String, Value>>,
) -> Result<Message> {
    let envelope: Value = serde_json::from_str(envelope)?;
    let message =
        Message::new(FORWARD_MSG_TYPE, json!({ "next": next })).attachment(Attachment::json(envelope));
    let Some(headers) = headers else {
        return Ok(message);
    };
    // Known headers such as `expires_time` land in their typed fields.
    let mut value = serde_json::to_value(&message)?;
    if let Some(object) = value.as_object_mut() {
        for (name, header) in headers {
            if RESERVED_FORWARD_FIELDS.contains(&name.as_str()) {
                debug!("Ignoring forward header `{name}`");
                continue;
            }
            object.insert(name.clone(), header.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Wraps `envelope` in one anoncrypted forward message per routing key.
///
/// `routing_keys[0]` is the first mediator to receive the result. The
/// innermost forward names `to` as `next`; each outer one names the routing
/// key it wraps.
///
/// # Errors
///
/// Resolution and encryption errors for the routing keys.
pub async fn wrap_in_forward(
    envelope: &str,
    headers: Option<&BTreeMap<String, Value>>,
    to: &str,
    routing_keys: &[String],
    enc_alg_anon: AnonCryptAlg,
    resolvers: &ResolversConfig,
) -> Result<String> {
    let nexts = routing_keys
        .iter()
        .skip(1)
        .map(String::as_str)
        .chain(std::iter::once(to));
    let hops: Vec<(&str, &str)> = routing_keys.iter().map(String::as_str).zip(nexts).collect();

    let mut packed = envelope.to_string();
    for (routing_key, next) in hops.into_iter().rev() {
        let forward = build_forward(&packed, next, headers)?;
        let doc = resolvers.resolve_doc(did_from_did_url(routing_key)).await?;
        let keys = recipient_keys(&doc, routing_key)?;
        packed = anoncrypt(serde_json::to_string(&forward)?.as_bytes(), &keys, enc_alg_anon)?.0;
        debug!("Wrapped message in forward to {routing_key} (next {next})");
    }
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_try_parse_forward() {
        let message = Message::new(FORWARD_MSG_TYPE, json!({"next": "did:example:bob"}))
            .attachment(Attachment::json(json!({"ciphertext": "AA"})));
        let forward = ForwardMessage::try_parse(&message).unwrap().unwrap();
        assert_eq!(forward.next, "did:example:bob");
        assert_eq!(forward.forwarded_msg, json!({"ciphertext": "AA"}));

        let other = Message::new("https://didcomm.org/basicmessage/2.0/message", json!({}));
        assert!(ForwardMessage::try_parse(&other).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_forward_version() {
        let message = Message::new(
            "https://didcomm.org/routing/1.0/forward",
            json!({"next": "did:example:bob"}),
        );
        let err = ForwardMessage::try_parse(&message).unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::NotSupportedFwdProtocol));
    }

    #[test]
    fn test_forward_without_attachment() {
        let message = Message::new(FORWARD_MSG_TYPE, json!({"next": "did:example:bob"}));
        let err = ForwardMessage::try_parse(&message).unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidMessage));

        let no_next = Message::new(FORWARD_MSG_TYPE, json!({}))
            .attachment(Attachment::json(json!({})));
        assert!(ForwardMessage::try_parse(&no_next).is_err());
    }

    #[test]
    fn test_build_forward_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("expires_time".to_string(), json!(99999));
        headers.insert("x-priority".to_string(), json!("high"));
        let forward = build_forward("{\"ciphertext\":\"AA\"}", "did:example:bob", Some(&headers)).unwrap();
        let value = serde_json::to_value(&forward).unwrap();
        assert_eq!(forward.expires_time, Some(99999));
        assert_eq!(value["x-priority"], "high");
        assert_eq!(value["body"]["next"], "did:example:bob");
        assert_eq!(value["attachments"][0]["data"]["json"]["ciphertext"], "AA");
    }

    #[test]
    fn test_build_forward_keeps_core_fields() {
        let mut headers = BTreeMap::new();
        headers.insert("id".to_string(), json!("forged-id"));
        headers.insert("type".to_string(), json!("https://example.com/other"));
        headers.insert("body".to_string(), json!({"next": "did:example:mallory"}));
        headers.insert("attachments".to_string(), json!([]));
        headers.insert("expires_time".to_string(), json!(42));

        let forward = build_forward("{\"ciphertext\":\"AA\"}", "did:example:bob", Some(&headers)).unwrap();
        assert_ne!(forward.id, "forged-id");
        assert_eq!(forward.expires_time, Some(42));

        let parsed = ForwardMessage::try_parse(&forward).unwrap().unwrap();
        assert_eq!(parsed.next, "did:example:bob");
        assert_eq!(parsed.forwarded_msg, json!({"ciphertext": "AA"}));
    }
}

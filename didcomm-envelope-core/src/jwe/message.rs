//! JWE message structure (general JSON serialization).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{JweError, Result};
use super::header::JweHeader;
use super::key_wrapping::ContentEncryptionKey;
use crate::error::{Error, MalformedKind};
use crate::utils::{b64_decode, b64_encode};

/// The unprotected per-recipient header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweRecipientHeader {
    /// The recipient key ID
    pub kid: String,
}

/// A recipient of a JWE message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweRecipient {
    /// The header for this recipient
    pub header: JweRecipientHeader,
    /// The encrypted key for this recipient (base64url-encoded)
    pub encrypted_key: String,
}

/// A complete JWE message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweMessage {
    /// The protected header (base64url-encoded)
    pub protected: String,
    /// The recipients of the message
    pub recipients: Vec<JweRecipient>,
    /// The initialization vector (base64url-encoded)
    pub iv: String,
    /// The ciphertext (base64url-encoded)
    pub ciphertext: String,
    /// The authentication tag (base64url-encoded)
    pub tag: String,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::malformed_with(MalformedKind::InvalidMessage, message)
}

fn required_b64(object: &serde_json::Map<String, Value>, field: &str) -> crate::error::Result<String> {
    let value = object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("JWE is missing `{field}`")))?;
    b64_decode(value).map_err(|_| invalid(format!("JWE `{field}` is not base64url")))?;
    Ok(value.to_string())
}

fn parse_recipient(value: &Value) -> crate::error::Result<JweRecipient> {
    let recipient: JweRecipient = serde_json::from_value(value.clone())
        .map_err(|e| invalid(format!("invalid JWE recipient: {e}")))?;
    b64_decode(&recipient.encrypted_key)
        .map_err(|_| invalid("JWE `encrypted_key` is not base64url"))?;
    Ok(recipient)
}

impl JweMessage {
    /// Encrypts `plaintext` under `cek` and assembles the message.
    ///
    /// The AEAD additional data is the ASCII of the encoded protected header.
    /// Recipients appear in the order of `encrypted_keys`.
    pub fn build(
        header: &JweHeader,
        cek: &ContentEncryptionKey,
        encrypted_keys: &[(String, Vec<u8>)],
        plaintext: &[u8],
    ) -> Result<Self> {
        if encrypted_keys.is_empty() {
            return Err(JweError::InvalidInput("JWE needs at least one recipient".to_string()));
        }
        let protected = header.encode()?;
        let content = header
            .enc
            .encrypt(plaintext, protected.as_bytes(), cek.as_bytes())?;

        Ok(Self {
            protected,
            recipients: encrypted_keys
                .iter()
                .map(|(kid, encrypted_key)| JweRecipient {
                    header: JweRecipientHeader { kid: kid.clone() },
                    encrypted_key: b64_encode(encrypted_key),
                })
                .collect(),
            iv: b64_encode(content.iv),
            ciphertext: b64_encode(content.ciphertext),
            tag: b64_encode(content.tag),
        })
    }

    /// Parses and structurally validates a JWE.
    ///
    /// Accepts the general serialization (`recipients`) and the flattened one
    /// (`header` + `encrypted_key`).
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_message)` if a field is missing or not base64url,
    /// or the protected header does not parse.
    pub fn parse(value: &Value) -> crate::error::Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("JWE must be a JSON object"))?;

        let protected = required_b64(object, "protected")?;
        let iv = required_b64(object, "iv")?;
        let ciphertext = required_b64(object, "ciphertext")?;
        let tag = required_b64(object, "tag")?;

        let recipients = match object.get("recipients") {
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_recipient)
                .collect::<crate::error::Result<Vec<_>>>()?,
            Some(_) => return Err(invalid("JWE `recipients` must be an array")),
            None => vec![parse_recipient(value)?],
        };
        if recipients.is_empty() {
            return Err(invalid("JWE has no recipients"));
        }

        let message = Self {
            protected,
            recipients,
            iv,
            ciphertext,
            tag,
        };
        message.protected_header()?;
        Ok(message)
    }

    /// Decodes the protected header.
    pub fn protected_header(&self) -> crate::error::Result<JweHeader> {
        JweHeader::decode(&self.protected)
            .map_err(|e| invalid(format!("invalid JWE protected header: {e}")))
    }

    /// Recipient kids in message order.
    pub fn recipient_kids(&self) -> Vec<String> {
        self.recipients
            .iter()
            .map(|recipient| recipient.header.kid.clone())
            .collect()
    }

    /// The decoded `encrypted_key` of recipient `kid`.
    pub fn encrypted_key_for(&self, kid: &str) -> Option<Vec<u8>> {
        self.recipients
            .iter()
            .find(|recipient| recipient.header.kid == kid)
            .and_then(|recipient| b64_decode(&recipient.encrypted_key).ok())
    }

    /// Decrypts the content with `cek`.
    ///
    /// # Errors
    ///
    /// `CannotDecrypt` for any failure.
    pub fn decrypt(&self, cek: &ContentEncryptionKey) -> Result<Vec<u8>> {
        let header = JweHeader::decode(&self.protected).map_err(|_| JweError::CannotDecrypt)?;
        let decode = |value: &str| b64_decode(value).map_err(|_| JweError::CannotDecrypt);
        header.enc.decrypt(
            &decode(&self.ciphertext)?,
            &decode(&self.iv)?,
            &decode(&self.tag)?,
            self.protected.as_bytes(),
            cek.as_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::algorithms::{generate_ephemeral_keypair, generate_random_key};
    use crate::jwe::header::EphemeralPublicKey;
    use crate::jwe::{ContentEncryptionAlgorithm, EcdhCurve};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample(enc: ContentEncryptionAlgorithm) -> (JweMessage, ContentEncryptionKey) {
        let (_, public) = generate_ephemeral_keypair(EcdhCurve::X25519);
        let epk = EphemeralPublicKey::new(EcdhCurve::X25519, &public).unwrap();
        let header = JweHeader::new_anoncrypt(enc, epk, b64_encode("apv"));
        let cek = ContentEncryptionKey::new(generate_random_key(enc.key_len()));
        let keys = vec![
            ("did:example:bob#key-2".to_string(), vec![1u8; 40]),
            ("did:example:bob#key-1".to_string(), vec![2u8; 40]),
        ];
        let message = JweMessage::build(&header, &cek, &keys, b"{\"hello\":\"world\"}").unwrap();
        (message, cek)
    }

    #[test]
    fn test_build_and_decrypt() {
        for enc in [
            ContentEncryptionAlgorithm::A256CbcHs512,
            ContentEncryptionAlgorithm::A256Gcm,
            ContentEncryptionAlgorithm::Xc20P,
        ] {
            let (message, cek) = sample(enc);
            assert_eq!(
                message.recipient_kids(),
                vec!["did:example:bob#key-2", "did:example:bob#key-1"]
            );
            assert_eq!(message.decrypt(&cek).unwrap(), b"{\"hello\":\"world\"}");

            let parsed = JweMessage::parse(&serde_json::to_value(&message).unwrap()).unwrap();
            assert_eq!(parsed, message);
        }
    }

    #[test]
    fn test_protected_header_is_aad() {
        let (mut message, cek) = sample(ContentEncryptionAlgorithm::Xc20P);
        let mut header = message.protected_header().unwrap();
        header.apv = b64_encode("other");
        message.protected = header.encode().unwrap();
        assert!(matches!(message.decrypt(&cek), Err(JweError::CannotDecrypt)));
    }

    #[test]
    fn test_parse_flattened() {
        let (message, _) = sample(ContentEncryptionAlgorithm::A256Gcm);
        let flattened = json!({
            "protected": message.protected,
            "header": {"kid": "did:example:bob#key-1"},
            "encrypted_key": message.recipients[1].encrypted_key,
            "iv": message.iv,
            "ciphertext": message.ciphertext,
            "tag": message.tag,
        });
        let parsed = JweMessage::parse(&flattened).unwrap();
        assert_eq!(parsed.recipient_kids(), vec!["did:example:bob#key-1"]);
        assert_eq!(parsed.encrypted_key_for("did:example:bob#key-1").unwrap(), vec![2u8; 40]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let (message, _) = sample(ContentEncryptionAlgorithm::A256Gcm);
        let valid = serde_json::to_value(&message).unwrap();

        let mut missing_tag = valid.clone();
        missing_tag.as_object_mut().unwrap().remove("tag");
        let mut bad_iv = valid.clone();
        bad_iv["iv"] = json!("not base64!");
        let mut no_recipients = valid.clone();
        no_recipients["recipients"] = json!([]);
        let mut bad_protected = valid;
        bad_protected["protected"] = json!(b64_encode("{}"));

        for value in [missing_tag, bad_iv, no_recipients, bad_protected, json!("jwe")] {
            let err = JweMessage::parse(&value).unwrap_err();
            assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidMessage));
        }
    }
}

//! Core DIDComm v2 plaintext message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Error, MalformedKind, Result};
use crate::from_prior::FromPrior;
use crate::utils::validate_did;

/// Media type of plaintext messages.
pub const PLAINTEXT_TYP: &str = "application/didcomm-plain+json";
/// Short form of [`PLAINTEXT_TYP`], accepted on unpack.
pub const PLAINTEXT_TYP_SHORT: &str = "didcomm-plain+json";
/// Media type of signed envelopes.
pub const SIGNED_TYP: &str = "application/didcomm-signed+json";
/// Short form of [`SIGNED_TYP`], accepted on unpack.
pub const SIGNED_TYP_SHORT: &str = "didcomm-signed+json";
/// Short form of the encrypted media type, accepted on unpack.
pub const ENCRYPTED_TYP_SHORT: &str = "didcomm-encrypted+json";
pub use crate::jwe::header::ENCRYPTED_TYP;

fn default_typ() -> String {
    PLAINTEXT_TYP.to_string()
}

/// The `from_prior` header: a signed token on the wire, a claim set before
/// packing and after unpacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FromPriorField {
    /// Compact JWT
    Token(String),
    /// Decoded or not yet signed claim set
    Claim(FromPrior),
}

/// A DIDComm v2 plaintext message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The message ID
    pub id: String,
    /// The message type URI
    #[serde(rename = "type")]
    pub type_: String,
    /// The media type
    #[serde(default = "default_typ")]
    pub typ: String,
    /// The message body
    pub body: Value,
    /// The sender's DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// The recipients' DIDs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    /// Thread ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    /// Parent thread ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,
    /// Creation time, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<u64>,
    /// Expiry time, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_time: Option<u64>,
    /// DID rotation claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_prior: Option<FromPriorField>,
    /// Requested acknowledgements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub please_ack: Option<Vec<String>>,
    /// Acknowledged message IDs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Vec<String>>,
    /// Message attachments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Custom headers
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Message {
    /// Creates a message with a random ID and the current time as `created_time`.
    pub fn new(type_: impl Into<String>, body: Value) -> Self {
        let created_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4().to_string(),
            type_: type_.into(),
            typ: default_typ(),
            body,
            from: None,
            to: None,
            thid: None,
            pthid: None,
            created_time: Some(created_time),
            expires_time: None,
            from_prior: None,
            please_ack: None,
            ack: None,
            attachments: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the message ID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the sender of the message
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the recipients of the message
    pub fn to(mut self, to: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to = Some(to.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the thread ID.
    pub fn thid(mut self, thid: impl Into<String>) -> Self {
        self.thid = Some(thid.into());
        self
    }

    /// Sets the parent thread ID.
    pub fn pthid(mut self, pthid: impl Into<String>) -> Self {
        self.pthid = Some(pthid.into());
        self
    }

    /// Sets the expiry time.
    pub fn expires_time(mut self, expires_time: u64) -> Self {
        self.expires_time = Some(expires_time);
        self
    }

    /// Attaches a DID rotation claim, signed when the message is packed.
    pub fn from_prior(mut self, claim: FromPrior) -> Self {
        self.from_prior = Some(FromPriorField::Claim(claim));
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.get_or_insert_with(Vec::new).push(attachment);
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Checks a message about to be packed.
    ///
    /// # Errors
    ///
    /// `Value` for an empty `id` or `type`, an unknown `typ`, or a `from`/`to`
    /// that is not a DID.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.type_.is_empty() {
            return Err(Error::Value("message `id` and `type` must not be empty".to_string()));
        }
        if !is_plaintext_typ(&self.typ) {
            return Err(Error::Value(format!("unknown message typ `{}`", self.typ)));
        }
        if let Some(from) = &self.from {
            validate_did("from", from)?;
        }
        for to in self.to.iter().flatten() {
            validate_did("to", to)?;
        }
        Ok(())
    }

    /// Parses a received plaintext message.
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_plaintext)` if `id`, `type` or `body` is
    /// missing, `typ` is not a plaintext media type, or a field has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::malformed_with(MalformedKind::InvalidPlaintext, "message is not a JSON object")
        })?;
        for field in ["id", "type", "body"] {
            if !object.contains_key(field) {
                return Err(Error::malformed_with(
                    MalformedKind::InvalidPlaintext,
                    format!("missing required field `{field}`"),
                ));
            }
        }
        let message: Message = serde_json::from_value(value)
            .map_err(|e| Error::malformed_with(MalformedKind::InvalidPlaintext, e.to_string()))?;
        if !is_plaintext_typ(&message.typ) {
            return Err(Error::malformed_with(
                MalformedKind::InvalidPlaintext,
                format!("invalid typ `{}`", message.typ),
            ));
        }
        Ok(message)
    }
}

fn is_plaintext_typ(typ: &str) -> bool {
    typ == PLAINTEXT_TYP || typ == PLAINTEXT_TYP_SHORT
}

/// Represents a message attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// The attachment ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The attachment description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The attachment filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// The attachment media type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// The attachment format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod_time: Option<u64>,
    /// Size of the content in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_count: Option<u64>,
    /// The attachment data
    pub data: AttachmentData,
}

impl Attachment {
    /// Creates an attachment with a random ID.
    pub fn new(data: AttachmentData) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            description: None,
            filename: None,
            media_type: None,
            format: None,
            lastmod_time: None,
            byte_count: None,
            data,
        }
    }

    /// Creates an attachment carrying inline JSON.
    pub fn json(json: Value) -> Self {
        Self::new(AttachmentData::Json {
            json,
            hash: None,
            jws: None,
        })
    }

    /// Sets the media type.
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Represents attachment data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentData {
    /// Content referenced by URLs; `hash` is mandatory
    Links {
        /// URLs of the content
        links: Vec<String>,
        /// Multihash of the content
        hash: String,
        /// Detached signature over the content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jws: Option<Value>,
    },
    /// Inline base64url content
    Base64 {
        /// The encoded content
        base64: String,
        /// Multihash of the content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
        /// Detached signature over the content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jws: Option<Value>,
    },
    /// Inline JSON content
    Json {
        /// The content
        json: Value,
        /// Multihash of the content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
        /// Detached signature over the content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jws: Option<Value>,
    },
}

//! Shape detection for received envelopes.

use serde_json::Value;

use crate::error::Result;
use crate::jwe::JweMessage;
use crate::jws::JwsMessage;

/// A received JSON value, classified by its outer structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// An encrypted envelope (`ciphertext` present)
    Jwe(JweMessage),
    /// A signed envelope (`payload` or `signatures` present)
    Jws(JwsMessage),
    /// Anything else that is a JSON object
    Plaintext(Value),
    /// Not a JSON object
    Unrecognized(Value),
}

impl Envelope {
    /// Classifies `value` and parses the JWE or JWS structure it claims to be.
    ///
    /// # Errors
    ///
    /// `MalformedMessage(invalid_message)` when the value looks like a JWE or
    /// JWS but is not a valid one.
    pub fn probe(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Ok(Envelope::Unrecognized(value));
        };
        if object.contains_key("ciphertext") {
            return Ok(Envelope::Jwe(JweMessage::parse(&value)?));
        }
        if object.contains_key("payload") || object.contains_key("signatures") {
            return Ok(Envelope::Jws(JwsMessage::parse(&value)?));
        }
        Ok(Envelope::Plaintext(value))
    }

    /// Short name of the shape, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Jwe(_) => "jwe",
            Envelope::Jws(_) => "jws",
            Envelope::Plaintext(_) => "plaintext",
            Envelope::Unrecognized(_) => "unrecognized",
        }
    }
}

//! DID syntax checks and base64url helpers shared across the crate.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// W3C DID grammar: `did:` method-name `:` method-specific-id, where the id is
/// colon-separated runs of idchars (`ALPHA / DIGIT / . / - / _ / pct-encoded`).
const DID_BASE: &str = r"did:[a-z0-9]+:(?:(?:[a-zA-Z0-9._-]|%[0-9A-Fa-f]{2})+:)*(?:[a-zA-Z0-9._-]|%[0-9A-Fa-f]{2})+";
const FRAGMENT: &str = r"#(?:[a-zA-Z0-9._-]|%[0-9A-Fa-f]{2})+";

static DID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{DID_BASE}(?:{FRAGMENT})?$")).expect("Failed to compile DID_REGEX")
});

static DID_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{DID_BASE}{FRAGMENT}$")).expect("Failed to compile DID_URL_REGEX")
});

/// Accepts padded and unpadded base64url on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Returns true for a DID, with or without a fragment.
pub fn is_did(value: &str) -> bool {
    DID_REGEX.is_match(value)
}

/// Returns true for a DID URL, i.e. a DID with a fragment.
pub fn is_did_url(value: &str) -> bool {
    DID_URL_REGEX.is_match(value)
}

/// Strips the fragment from a DID URL.
pub fn did_from_did_url(did_url: &str) -> &str {
    did_url.split('#').next().unwrap_or(did_url)
}

/// Splits a DID or DID URL into the DID and, if present, the full DID URL.
pub fn did_or_url(value: &str) -> (&str, Option<&str>) {
    if value.contains('#') {
        (did_from_did_url(value), Some(value))
    } else {
        (value, None)
    }
}

/// Validates a DID or DID URL argument.
///
/// # Errors
/// * `Error::Value` - If the string does not match the DID syntax
pub fn validate_did(name: &str, value: &str) -> Result<()> {
    if is_did(value) {
        Ok(())
    } else {
        Err(Error::Value(format!("`{name}` value is not a DID or DID URL: {value}")))
    }
}

/// Encodes bytes as unpadded base64url.
pub fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url, padded or not.
pub fn b64_decode(value: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT.decode(value)
}

//! Key agreement for JWE: Concat KDF and ECDH-ES / ECDH-1PU CEK derivation.
//!
//! Both modes wrap one random content encryption key (CEK) per message for
//! every recipient. The key encryption key (KEK) for a recipient is derived
//! with the Concat KDF from an ECDH shared secret:
//!
//! - ECDH-ES (anoncrypt): `Z = ECDH(epk, recipient)`
//! - ECDH-1PU (authcrypt): `Z = ECDH(epk, recipient) || ECDH(sender, recipient)`

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::algorithms::{ecdh_key_agreement, generate_ephemeral_keypair, generate_random_key};
use super::error::{JweError, Result};
use super::header::{EphemeralPublicKey, JweHeader};
use super::key_wrapping::{unwrap_key, wrap_key, ContentEncryptionKey};
use super::types::{AnonCryptAlg, AuthCryptAlg, KeyAgreementAlgorithm};
use super::EcdhCurve;
use crate::keys::KeyMaterial;
use crate::utils::b64_encode;

/// Length in bits of the A256KW key encryption key.
const KEK_BITS: usize = 256;

/// Output of CEK derivation for a set of recipients.
#[derive(Debug)]
pub struct CekDerivation {
    /// The content encryption key shared by all recipients
    pub cek: ContentEncryptionKey,
    /// `(kid, encrypted_key)` per recipient, in the order supplied
    pub encrypted_keys: Vec<(String, Vec<u8>)>,
    /// The ephemeral public key
    pub epk: EphemeralPublicKey,
    /// base64url sender kid (authcrypt only)
    pub apu: Option<String>,
    /// base64url SHA-256 of the sorted recipient kids
    pub apv: String,
}

/// Concat KDF (NIST SP 800-56A one-step KDF) with SHA-256.
///
/// `OtherInfo` is `len || alg || len || apu || len || apv || keydatalen`, with
/// 32-bit big-endian lengths.
///
/// # Errors
///
/// `InvalidInput` if `key_data_len_bits` is zero or not a multiple of 8.
pub fn concat_kdf(
    shared_secret: &[u8],
    key_data_len_bits: usize,
    alg: &str,
    apu: &[u8],
    apv: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if key_data_len_bits == 0 || key_data_len_bits % 8 != 0 {
        return Err(JweError::InvalidInput(
            "key data length must be a positive multiple of 8".to_string(),
        ));
    }

    let mut other_info = Vec::with_capacity(16 + alg.len() + apu.len() + apv.len());
    for part in [alg.as_bytes(), apu, apv] {
        other_info.extend_from_slice(&(part.len() as u32).to_be_bytes());
        other_info.extend_from_slice(part);
    }
    other_info.extend_from_slice(&(key_data_len_bits as u32).to_be_bytes());

    let key_len = key_data_len_bits / 8;
    let rounds = key_len.div_ceil(32);
    let mut derived = Zeroizing::new(Vec::with_capacity(rounds * 32));
    for counter in 1..=rounds as u32 {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_secret);
        hasher.update(&other_info);
        derived.extend_from_slice(&hasher.finalize());
    }
    derived.truncate(key_len);
    Ok(derived)
}

fn apv_digest<S: AsRef<str>>(kids: &[S]) -> Vec<u8> {
    let mut sorted: Vec<&str> = kids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    Sha256::digest(sorted.join(".").as_bytes()).to_vec()
}

/// Computes `apv`: base64url of SHA-256 over the sorted recipient kids joined by `.`.
///
/// The result does not depend on the order of `kids`.
pub fn calculate_apv<S: AsRef<str>>(kids: &[S]) -> String {
    b64_encode(apv_digest(kids))
}

/// Finds the curve shared by all recipients.
fn common_curve(recipients: &[(&str, &KeyMaterial)]) -> Result<EcdhCurve> {
    let (first_kid, first_key) = recipients
        .first()
        .ok_or_else(|| JweError::InvalidInput("no recipients".to_string()))?;
    let curve = first_key.ecdh_curve().ok_or_else(|| {
        JweError::IncompatibleCrypto(format!(
            "{first_kid} is a {} key and cannot be used for key agreement",
            first_key.curve()
        ))
    })?;
    for (kid, key) in &recipients[1..] {
        if key.ecdh_curve() != Some(curve) {
            return Err(JweError::IncompatibleCrypto(format!(
                "recipient {kid} does not use {curve}"
            )));
        }
    }
    Ok(curve)
}

fn private_part(key: &KeyMaterial) -> Result<&[u8]> {
    key.private_bytes()
        .ok_or_else(|| JweError::InvalidKeyMaterial("key has no private part".to_string()))
}

/// Derives a CEK for anonymous encryption (ECDH-ES+A256KW).
///
/// One ephemeral key pair is generated per call, on the curve shared by all
/// recipients.
///
/// # Errors
///
/// `IncompatibleCrypto` if the recipients use different curves or a curve
/// without ECDH; `InvalidInput` for an empty recipient list.
pub fn derive_anoncrypt_cek(
    alg: AnonCryptAlg,
    recipients: &[(&str, &KeyMaterial)],
) -> Result<CekDerivation> {
    let curve = common_curve(recipients)?;
    let algs = alg.algs();
    let kids: Vec<&str> = recipients.iter().map(|(kid, _)| *kid).collect();
    let apv = apv_digest(&kids);

    let (epk_private, epk_public) = generate_ephemeral_keypair(curve);
    let cek = generate_random_key(algs.enc.key_len());

    let mut encrypted_keys = Vec::with_capacity(recipients.len());
    for (kid, key) in recipients {
        let z = ecdh_key_agreement(curve, &epk_private, key.public_bytes())?;
        let kek = concat_kdf(&z, KEK_BITS, algs.alg.as_str(), &[], &apv)?;
        encrypted_keys.push((kid.to_string(), wrap_key(&kek, &cek)?));
    }

    Ok(CekDerivation {
        cek: ContentEncryptionKey::new(cek),
        encrypted_keys,
        epk: EphemeralPublicKey::new(curve, &epk_public)?,
        apu: None,
        apv: b64_encode(apv),
    })
}

/// Derives a CEK for authenticated encryption (ECDH-1PU+A256KW).
///
/// # Errors
///
/// `IncompatibleCrypto` if the sender and recipient curves differ;
/// `InvalidKeyMaterial` if the sender key has no private part.
pub fn derive_authcrypt_cek(
    alg: AuthCryptAlg,
    sender_kid: &str,
    sender: &KeyMaterial,
    recipients: &[(&str, &KeyMaterial)],
) -> Result<CekDerivation> {
    let curve = common_curve(recipients)?;
    if sender.ecdh_curve() != Some(curve) {
        return Err(JweError::IncompatibleCrypto(format!(
            "sender {sender_kid} ({}) cannot agree keys with {curve} recipients",
            sender.curve()
        )));
    }
    let sender_private = private_part(sender)?;
    let algs = alg.algs();
    let kids: Vec<&str> = recipients.iter().map(|(kid, _)| *kid).collect();
    let apv = apv_digest(&kids);
    let apu = sender_kid.as_bytes();

    let (epk_private, epk_public) = generate_ephemeral_keypair(curve);
    let cek = generate_random_key(algs.enc.key_len());

    let mut encrypted_keys = Vec::with_capacity(recipients.len());
    for (kid, key) in recipients {
        let mut z = ecdh_key_agreement(curve, &epk_private, key.public_bytes())?;
        z.extend_from_slice(&ecdh_key_agreement(curve, sender_private, key.public_bytes())?);
        let kek = concat_kdf(&z, KEK_BITS, algs.alg.as_str(), apu, &apv)?;
        encrypted_keys.push((kid.to_string(), wrap_key(&kek, &cek)?));
    }

    Ok(CekDerivation {
        cek: ContentEncryptionKey::new(cek),
        encrypted_keys,
        epk: EphemeralPublicKey::new(curve, &epk_public)?,
        apu: Some(b64_encode(apu)),
        apv: b64_encode(apv),
    })
}

/// Recovers the CEK from one recipient's `encrypted_key`.
///
/// `apu` and `apv` are taken from the received header as sent. `sender` is
/// the sender's key agreement key and is required for ECDH-1PU.
///
/// # Errors
///
/// `CannotDecrypt` for any failure that depends on received data, including
/// an invalid `epk` point and an unwrap failure.
pub fn resolve_cek_for_recipient(
    header: &JweHeader,
    own: &KeyMaterial,
    sender: Option<&KeyMaterial>,
    wrapped: &[u8],
) -> Result<ContentEncryptionKey> {
    let curve = header.epk.crv;
    if own.ecdh_curve() != Some(curve) {
        return Err(JweError::IncompatibleCrypto(format!(
            "recipient key ({}) does not match epk curve {curve}",
            own.curve()
        )));
    }
    let own_private = private_part(own)?;
    let epk = header.epk.raw_public_key()?;

    let mut z = ecdh_key_agreement(curve, own_private, &epk).map_err(|_| JweError::CannotDecrypt)?;
    if header.alg == KeyAgreementAlgorithm::Ecdh1puA256kw {
        let sender = sender.ok_or_else(|| {
            JweError::InvalidInput("ECDH-1PU requires the sender key".to_string())
        })?;
        if sender.ecdh_curve() != Some(curve) {
            return Err(JweError::IncompatibleCrypto(format!(
                "sender key ({}) does not match epk curve {curve}",
                sender.curve()
            )));
        }
        z.extend_from_slice(&ecdh_key_agreement(curve, own_private, sender.public_bytes())?);
    }

    let kek = concat_kdf(
        &z,
        KEK_BITS,
        header.alg.as_str(),
        &header.apu_bytes()?,
        &header.apv_bytes()?,
    )?;
    let cek = unwrap_key(&kek, wrapped)?;
    if cek.as_bytes().len() != header.enc.key_len() {
        return Err(JweError::CannotDecrypt);
    }
    Ok(cek)
}

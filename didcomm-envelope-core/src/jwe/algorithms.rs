//! Cryptographic algorithms for JWE operations.
//!
//! This module provides the primitives behind DIDComm v2 JWE envelopes:
//! - ECDH key agreement on `X25519`, `P-256` and `P-384`
//! - Ephemeral key pair generation
//! - Content encryption (`A256CBC-HS512`, `A256GCM`, `XC20P`)
//!
//! # Security Considerations
//!
//! - Private scalars and shared secrets are returned in [`Zeroizing`] buffers
//! - IVs and nonces are always freshly generated from the OS RNG
//! - Every decryption failure is reported as [`JweError::CannotDecrypt`]
//! - Authentication tags are compared in constant time

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hmac::{Hmac, Mac};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{OsRng, RngCore};
use sha2::Sha512;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::error::{JweError, Result};
use super::EcdhCurve;

type HmacSha512 = Hmac<Sha512>;

/// The size of an AES block in bytes.
const AES_BLOCK_SIZE: usize = 16;

/// The size of the truncated A256CBC-HS512 authentication tag in bytes.
const CBC_HMAC_TAG_SIZE: usize = 32;

/// The size of the GCM and Poly1305 authentication tags in bytes.
const AEAD_TAG_SIZE: usize = 16;

/// Output of a content encryption step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    /// The ciphertext
    pub ciphertext: Vec<u8>,
    /// The IV or nonce generated for this encryption
    pub iv: Vec<u8>,
    /// The authentication tag
    pub tag: Vec<u8>,
}

/// Generates a random key of the specified size.
///
/// Uses the system's secure random number generator.
pub fn generate_random_key(size: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; size]);
    OsRng.fill_bytes(&mut key);
    key
}

fn random_bytes(size: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Performs ECDH key agreement using the specified curve.
///
/// # Arguments
///
/// * `curve` - The elliptic curve to use
/// * `private_key` - The raw private scalar
/// * `public_key` - The raw public key (32 bytes for `X25519`, SEC1 for NIST curves)
///
/// # Errors
///
/// Returns `InvalidKeyMaterial` if either key cannot be parsed for the curve.
pub fn ecdh_key_agreement(
    curve: EcdhCurve,
    private_key: &[u8],
    public_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match curve {
        EcdhCurve::X25519 => x25519_key_agreement(private_key, public_key),
        EcdhCurve::P256 => p256_key_agreement(private_key, public_key),
        EcdhCurve::P384 => p384_key_agreement(private_key, public_key),
    }
}

/// Generates an ephemeral key pair for the specified curve.
///
/// # Returns
///
/// A tuple containing the private scalar and the public key. NIST public keys
/// are returned as uncompressed SEC1 points.
pub fn generate_ephemeral_keypair(curve: EcdhCurve) -> (Zeroizing<Vec<u8>>, Vec<u8>) {
    match curve {
        EcdhCurve::X25519 => {
            let secret = StaticSecret::random_from_rng(OsRng);
            let public = X25519PublicKey::from(&secret);
            (
                Zeroizing::new(secret.to_bytes().to_vec()),
                public.as_bytes().to_vec(),
            )
        }
        EcdhCurve::P256 => {
            let secret = p256::SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            (
                Zeroizing::new(secret.to_bytes().to_vec()),
                public.as_bytes().to_vec(),
            )
        }
        EcdhCurve::P384 => {
            let secret = p384::SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            (
                Zeroizing::new(secret.to_bytes().to_vec()),
                public.as_bytes().to_vec(),
            )
        }
    }
}

fn x25519_key_agreement(private_key: &[u8], public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let private: [u8; 32] = private_key
        .try_into()
        .map_err(|_| JweError::InvalidKeyMaterial("X25519 private key must be 32 bytes".into()))?;
    let public: [u8; 32] = public_key
        .try_into()
        .map_err(|_| JweError::InvalidKeyMaterial("X25519 public key must be 32 bytes".into()))?;

    let secret = StaticSecret::from(private);
    let shared = secret.diffie_hellman(&X25519PublicKey::from(public));
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}

fn p256_key_agreement(private_key: &[u8], public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let secret = p256::SecretKey::from_slice(private_key)
        .map_err(|e| JweError::InvalidKeyMaterial(format!("Invalid P-256 private key: {}", e)))?;
    let public = p256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| JweError::InvalidKeyMaterial(format!("Invalid P-256 public key: {}", e)))?;

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

fn p384_key_agreement(private_key: &[u8], public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let secret = p384::SecretKey::from_slice(private_key)
        .map_err(|e| JweError::InvalidKeyMaterial(format!("Invalid P-384 private key: {}", e)))?;
    let public = p384::PublicKey::from_sec1_bytes(public_key)
        .map_err(|e| JweError::InvalidKeyMaterial(format!("Invalid P-384 public key: {}", e)))?;

    let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

/// Encrypts data using AES-256-GCM with a random 12-byte IV.
///
/// # Errors
///
/// Returns `InvalidInput` if the key is not 32 bytes.
pub fn encrypt_aes_gcm(plaintext: &[u8], aad: &[u8], key: &[u8]) -> Result<EncryptedContent> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| JweError::InvalidInput("A256GCM key must be 32 bytes".into()))?;
    let iv = random_bytes(12);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), aad, &mut buffer)
        .map_err(|e| JweError::Encryption(e.to_string()))?;

    Ok(EncryptedContent {
        ciphertext: buffer,
        iv,
        tag: tag.to_vec(),
    })
}

/// Decrypts data using AES-256-GCM.
///
/// # Errors
///
/// Returns `CannotDecrypt` on any failure.
pub fn decrypt_aes_gcm(
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != 12 || tag.len() != AEAD_TAG_SIZE {
        return Err(JweError::CannotDecrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| JweError::CannotDecrypt)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            aad,
            &mut buffer,
            aes_gcm::Tag::from_slice(tag),
        )
        .map_err(|_| JweError::CannotDecrypt)?;
    Ok(buffer)
}

/// Encrypts data using XChaCha20-Poly1305 with a random 24-byte nonce.
///
/// # Errors
///
/// Returns `InvalidInput` if the key is not 32 bytes.
pub fn encrypt_xchacha20poly1305(
    plaintext: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<EncryptedContent> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| JweError::InvalidInput("XC20P key must be 32 bytes".into()))?;
    let iv = random_bytes(24);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&iv), aad, &mut buffer)
        .map_err(|e| JweError::Encryption(e.to_string()))?;

    Ok(EncryptedContent {
        ciphertext: buffer,
        iv,
        tag: tag.to_vec(),
    })
}

/// Decrypts data using XChaCha20-Poly1305.
///
/// # Errors
///
/// Returns `CannotDecrypt` on any failure.
pub fn decrypt_xchacha20poly1305(
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    if iv.len() != 24 || tag.len() != AEAD_TAG_SIZE {
        return Err(JweError::CannotDecrypt);
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| JweError::CannotDecrypt)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(iv),
            aad,
            &mut buffer,
            chacha20poly1305::Tag::from_slice(tag),
        )
        .map_err(|_| JweError::CannotDecrypt)?;
    Ok(buffer)
}

/// Computes the A256CBC-HS512 tag: HMAC-SHA-512 over `aad ‖ iv ‖ ciphertext ‖ AL`,
/// where `AL` is the AAD length in bits as a 64-bit big-endian integer.
fn cbc_hmac_mac(mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha512> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(mac_key)
        .map_err(|e| JweError::InvalidInput(format!("HMAC initialization failed: {}", e)))?;
    let aad_bits = (aad.len() as u64).wrapping_mul(8);
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&aad_bits.to_be_bytes());
    Ok(mac)
}

/// Encrypts content using AES-256-CBC with HMAC-SHA-512.
///
/// The 64-byte key is split into a MAC key (first half) and an encryption key
/// (second half). Plaintext is PKCS7 padded.
///
/// # Errors
///
/// Returns `InvalidInput` if the key is not 64 bytes.
pub fn encrypt_aes_cbc_hmac(plaintext: &[u8], aad: &[u8], key: &[u8]) -> Result<EncryptedContent> {
    if key.len() != 64 {
        return Err(JweError::InvalidInput("A256CBC-HS512 key must be 64 bytes".into()));
    }
    let (mac_key, enc_key) = key.split_at(32);
    let cipher = <Aes256 as KeyInit>::new_from_slice(enc_key)
        .map_err(|_| JweError::InvalidInput("invalid AES-256 key".into()))?;
    let iv = random_bytes(AES_BLOCK_SIZE);

    // PKCS7
    let padding_len = AES_BLOCK_SIZE - (plaintext.len() % AES_BLOCK_SIZE);
    let mut padded = plaintext.to_vec();
    padded.extend(std::iter::repeat(padding_len as u8).take(padding_len));

    let mut ciphertext = Vec::with_capacity(padded.len());
    let mut prev_block = Block::clone_from_slice(&iv);
    for chunk in padded.chunks(AES_BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        ciphertext.extend_from_slice(&block);
        prev_block = block;
    }

    let mac = cbc_hmac_mac(mac_key, aad, &iv, &ciphertext)?;
    let tag = mac.finalize().into_bytes()[..CBC_HMAC_TAG_SIZE].to_vec();

    Ok(EncryptedContent {
        ciphertext,
        iv,
        tag,
    })
}

/// Decrypts content using AES-256-CBC with HMAC-SHA-512.
///
/// The tag is verified before any decryption is attempted.
///
/// # Errors
///
/// Returns `CannotDecrypt` on any failure, padding errors included.
pub fn decrypt_aes_cbc_hmac(
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    if key.len() != 64
        || iv.len() != AES_BLOCK_SIZE
        || tag.len() != CBC_HMAC_TAG_SIZE
        || ciphertext.is_empty()
        || ciphertext.len() % AES_BLOCK_SIZE != 0
    {
        return Err(JweError::CannotDecrypt);
    }
    let (mac_key, enc_key) = key.split_at(32);

    let mac = cbc_hmac_mac(mac_key, aad, iv, ciphertext).map_err(|_| JweError::CannotDecrypt)?;
    mac.verify_truncated_left(tag)
        .map_err(|_| JweError::CannotDecrypt)?;

    let cipher = <Aes256 as KeyInit>::new_from_slice(enc_key).map_err(|_| JweError::CannotDecrypt)?;
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut prev_block = Block::clone_from_slice(iv);
    for chunk in ciphertext.chunks(AES_BLOCK_SIZE) {
        let encrypted_block = Block::clone_from_slice(chunk);
        let mut block = encrypted_block;
        cipher.decrypt_block(&mut block);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= p;
        }
        plaintext.extend_from_slice(&block);
        prev_block = encrypted_block;
    }

    let padding_len = *plaintext.last().ok_or(JweError::CannotDecrypt)? as usize;
    if padding_len == 0 || padding_len > AES_BLOCK_SIZE {
        return Err(JweError::CannotDecrypt);
    }
    if plaintext[plaintext.len() - padding_len..]
        .iter()
        .any(|&byte| byte as usize != padding_len)
    {
        return Err(JweError::CannotDecrypt);
    }
    plaintext.truncate(plaintext.len() - padding_len);

    Ok(plaintext)
}

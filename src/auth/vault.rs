//! Encryption at rest for the stored judge password.
//!
//! The key is derived from fixed salts around the on-record handle, so the
//! ciphertext only opens for the handle it was sealed with. Editing the stored
//! handle therefore invalidates the stored password; re-run `credentials`.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const KEY_SALT_PREFIX: &str = "glhf";
const KEY_SALT_SUFFIX: &str = "233";
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Errors for password encryption and decryption.
///
/// Messages never include the plaintext or the ciphertext.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Stored ciphertext is not hex, is truncated, or fails authentication.
    #[error("cannot decrypt the stored password: {reason}")]
    Decryption {
        /// What went wrong, without any secret material.
        reason: &'static str,
    },
    /// AEAD sealing failed.
    #[error("failed to encrypt the password")]
    Encryption,
}

/// Encrypts `plaintext` for `handle` and returns hex text (`nonce || ciphertext`).
///
/// A fresh random nonce is drawn per call, so encrypting the same password
/// twice yields different output.
///
/// # Errors
///
/// Returns [`VaultError::Encryption`] if the AEAD rejects the input.
pub fn encrypt(handle: &str, plaintext: &str) -> Result<String, VaultError> {
    encrypt_bytes(handle, plaintext.as_bytes())
}

/// Decrypts hex text produced by [`encrypt`] for the same `handle`.
///
/// # Errors
///
/// Returns [`VaultError::Decryption`] if the text is not hex, is too short to
/// hold a nonce and tag, fails authentication, or is not UTF-8 once opened.
pub fn decrypt(handle: &str, ciphertext: &str) -> Result<String, VaultError> {
    let plain = decrypt_bytes(handle, ciphertext)?;
    String::from_utf8(plain).map_err(|_| VaultError::Decryption {
        reason: "password is not valid UTF-8",
    })
}

/// Byte-level variant of [`encrypt`].
///
/// # Errors
///
/// See [`encrypt`].
pub fn encrypt_bytes(handle: &str, plaintext: &[u8]) -> Result<String, VaultError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&derive_key_bytes(handle)));

    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Encryption)?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&sealed);
    Ok(hex_encode(&output))
}

/// Byte-level variant of [`decrypt`].
///
/// # Errors
///
/// See [`decrypt`].
pub fn decrypt_bytes(handle: &str, ciphertext: &str) -> Result<Vec<u8>, VaultError> {
    let payload = hex_decode(ciphertext.trim()).ok_or(VaultError::Decryption {
        reason: "not valid hex",
    })?;
    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Decryption {
            reason: "ciphertext is truncated",
        });
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&derive_key_bytes(handle)));
    let (nonce, sealed) = payload.split_at(NONCE_LEN);

    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| VaultError::Decryption {
            reason: "authentication failed (wrong handle or tampered data)",
        })
}

fn derive_key_bytes(handle: &str) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(KEY_SALT_PREFIX.as_bytes());
    hasher.update(handle.as_bytes());
    hasher.update(KEY_SALT_SUFFIX.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0_u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }

    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| Some((hex_value(pair[0])? << 4) | hex_value(pair[1])?))
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

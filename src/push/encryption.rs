//! Message encryption for the legacy `aesgcm` Web Push content encoding.
//!
//! Each call draws a fresh salt and ephemeral ECDH key pair, so encrypting the
//! same payload twice never yields the same ciphertext. The relay receives the
//! ephemeral public key and the salt in the `Crypto-Key` and `Encryption`
//! headers; the ciphertext body is a single record.

use base64::{STANDARD_NO_PAD, URL_SAFE_NO_PAD, decode_config};
use thiserror::Error;

use crate::ports::{CryptoError, CryptoProvider};
use crate::push::hkdf::hkdf;
use crate::types::push::{AUTH_SECRET_LEN, EncryptedMessage, SALT_LEN, UNCOMPRESSED_POINT_LEN};

pub(crate) const CONTENT_ENCODING: &str = "aesgcm";

const AUTH_INFO: &[u8] = b"Content-Encoding: auth\0";
const CURVE_LABEL: &[u8] = b"P-256";
const PRK_LEN: usize = 32;
const CEK_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PADDING_LEN: u16 = 0;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("{0} is not valid base64url")]
    Encoding(&'static str),
    #[error("client public key must be a 65-byte uncompressed P-256 point, got {0} bytes")]
    InvalidClientKey(usize),
    #[error("auth secret must be 16 bytes, got {0} bytes")]
    InvalidAuthSecret(usize),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Decodes a subscription's base64url key material and checks its shape.
pub fn decode_key_material(
    client_public_key: &str,
    auth_secret: &str,
) -> Result<([u8; UNCOMPRESSED_POINT_LEN], [u8; AUTH_SECRET_LEN]), EncryptionError> {
    let client = decode_base64url(client_public_key)
        .ok_or(EncryptionError::Encoding("client public key"))?;
    let auth = decode_base64url(auth_secret).ok_or(EncryptionError::Encoding("auth secret"))?;

    if client.len() != UNCOMPRESSED_POINT_LEN || client[0] != 0x04 {
        return Err(EncryptionError::InvalidClientKey(client.len()));
    }
    let client: [u8; UNCOMPRESSED_POINT_LEN] = client
        .as_slice()
        .try_into()
        .map_err(|_| EncryptionError::InvalidClientKey(client.len()))?;
    let auth: [u8; AUTH_SECRET_LEN] = auth
        .as_slice()
        .try_into()
        .map_err(|_| EncryptionError::InvalidAuthSecret(auth.len()))?;
    Ok((client, auth))
}

fn decode_base64url(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return None;
    }
    decode_config(trimmed, URL_SAFE_NO_PAD)
        .or_else(|_| decode_config(trimmed, STANDARD_NO_PAD))
        .ok()
}

pub fn encrypt<C: CryptoProvider>(
    crypto: &C,
    plaintext: &[u8],
    client_public_key: &[u8; UNCOMPRESSED_POINT_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<EncryptedMessage, EncryptionError> {
    let mut salt = [0u8; SALT_LEN];
    crypto.fill_random(&mut salt)?;

    let (ephemeral, server_public_key) = crypto.generate_ecdh_key_pair()?;
    let shared_secret = crypto.ecdh_derive_bits(&ephemeral, client_public_key)?;

    let prk = hkdf(crypto, auth_secret, &shared_secret, AUTH_INFO, PRK_LEN)?;
    let cek_info = content_info("aesgcm", client_public_key, &server_public_key);
    let nonce_info = content_info("nonce", client_public_key, &server_public_key);
    let cek = hkdf(crypto, &salt, &prk, &cek_info, CEK_LEN)?;
    let nonce = hkdf(crypto, &salt, &prk, &nonce_info, NONCE_LEN)?;

    let mut record = Vec::with_capacity(2 + plaintext.len());
    record.extend_from_slice(&PADDING_LEN.to_be_bytes());
    record.extend_from_slice(plaintext);
    let ciphertext = crypto.aes_gcm_encrypt(&cek, &nonce, &record)?;

    Ok(EncryptedMessage {
        ciphertext,
        server_public_key,
        salt,
    })
}

/// `"Content-Encoding: <label>\0P-256\0" || len(client) || client || len(server) || server`
fn content_info(
    label: &str,
    client_public_key: &[u8; UNCOMPRESSED_POINT_LEN],
    server_public_key: &[u8; UNCOMPRESSED_POINT_LEN],
) -> Vec<u8> {
    let key_len = (UNCOMPRESSED_POINT_LEN as u16).to_be_bytes();
    let mut info = Vec::with_capacity(32 + label.len() + 2 * (2 + UNCOMPRESSED_POINT_LEN));
    info.extend_from_slice(b"Content-Encoding: ");
    info.extend_from_slice(label.as_bytes());
    info.push(0);
    info.extend_from_slice(CURVE_LABEL);
    info.push(0);
    info.extend_from_slice(&key_len);
    info.extend_from_slice(client_public_key);
    info.extend_from_slice(&key_len);
    info.extend_from_slice(server_public_key);
    info
}

use base64::{URL_SAFE_NO_PAD, decode_config, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::config;
use crate::ports::{CryptoError, CryptoProvider};
use crate::types::push::{PRIVATE_KEY_LEN, UNCOMPRESSED_POINT_LEN, VapidConfig, VapidKeyPair};

/// Lifetime of a signed token; relays reject anything valid for more than 24h.
const TOKEN_TTL: Duration = Duration::hours(12);

#[derive(Debug, Error)]
pub enum VapidError {
    #[error("VAPID {0} is not valid base64url")]
    Encoding(&'static str),
    #[error("VAPID public key must be a 65-byte uncompressed P-256 point")]
    InvalidPublicKey,
    #[error("VAPID private key must be a 32-byte P-256 scalar")]
    InvalidPrivateKey,
    #[error("VAPID public key does not belong to the private key")]
    MismatchedKeys,
    #[error("VAPID subject must not be empty")]
    MissingSubject,
    #[error("cannot derive relay origin from endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("failed to encode token: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Invalid(String),
    Ready(VapidConfig),
}

impl VapidConfigStatus {
    pub fn ready(&self) -> Option<&VapidConfig> {
        match self {
            VapidConfigStatus::Ready(vapid) => Some(vapid),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            VapidConfigStatus::Missing => "VAPID configuration missing".to_string(),
            VapidConfigStatus::Incomplete => "incomplete VAPID configuration".to_string(),
            VapidConfigStatus::Invalid(reason) => format!("invalid VAPID configuration: {reason}"),
            VapidConfigStatus::Ready(_) => "VAPID configuration ready".to_string(),
        }
    }
}

pub fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = config.vapid_private_key.as_deref();
    let public_key = config.vapid_public_key.as_deref();
    let subject = config.vapid_subject.as_deref();
    let has_any = private_key.is_some() || public_key.is_some() || subject.is_some();

    match (private_key, public_key, subject) {
        (Some(private_key), Some(public_key), Some(subject)) => {
            let subject = subject.trim();
            if subject.is_empty() {
                return VapidConfigStatus::Invalid(VapidError::MissingSubject.to_string());
            }
            match VapidKeyPair::from_base64url(public_key, private_key) {
                Ok(key_pair) => VapidConfigStatus::Ready(VapidConfig {
                    key_pair,
                    subject: subject.to_string(),
                }),
                Err(err) => VapidConfigStatus::Invalid(err.to_string()),
            }
        }
        _ if has_any => VapidConfigStatus::Incomplete,
        _ => VapidConfigStatus::Missing,
    }
}

impl VapidKeyPair {
    /// Decodes both halves and checks the public key is the private key's point.
    pub fn from_base64url(public_key: &str, private_key: &str) -> Result<Self, VapidError> {
        let public_bytes = decode_config(public_key.trim(), URL_SAFE_NO_PAD)
            .map_err(|_| VapidError::Encoding("public key"))?;
        let private_bytes = decode_config(private_key.trim(), URL_SAFE_NO_PAD)
            .map_err(|_| VapidError::Encoding("private key"))?;

        let public_key: [u8; UNCOMPRESSED_POINT_LEN] = public_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VapidError::InvalidPublicKey)?;
        if public_key[0] != 0x04 {
            return Err(VapidError::InvalidPublicKey);
        }
        let private_key: [u8; PRIVATE_KEY_LEN] = private_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VapidError::InvalidPrivateKey)?;

        if derive_public_key(&private_key)? != public_key {
            return Err(VapidError::MismatchedKeys);
        }

        Ok(Self {
            public_key,
            private_key,
        })
    }

    pub fn public_key_base64url(&self) -> String {
        encode_config(self.public_key, URL_SAFE_NO_PAD)
    }
}

fn derive_public_key(private_key: &[u8]) -> Result<[u8; UNCOMPRESSED_POINT_LEN], VapidError> {
    let signing_key =
        SigningKey::from_slice(private_key).map_err(|_| VapidError::InvalidPrivateKey)?;
    let point = signing_key.verifying_key().to_encoded_point(false);
    point
        .as_bytes()
        .try_into()
        .map_err(|_| VapidError::InvalidPublicKey)
}

#[derive(Serialize)]
struct TokenHeader {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Signs an ES256 JWT for one relay origin. Tokens are audience-bound, so one
/// is produced per delivery rather than shared between relays.
pub fn sign_token<C: CryptoProvider>(
    crypto: &C,
    audience: &str,
    subject: &str,
    key_pair: &VapidKeyPair,
    now: OffsetDateTime,
) -> Result<String, VapidError> {
    let header = serde_json::to_vec(&TokenHeader {
        typ: "JWT",
        alg: "ES256",
    })?;
    let claims = serde_json::to_vec(&TokenClaims {
        aud: audience,
        exp: (now + TOKEN_TTL).unix_timestamp(),
        sub: subject,
    })?;
    let signing_input = format!(
        "{}.{}",
        encode_config(header, URL_SAFE_NO_PAD),
        encode_config(claims, URL_SAFE_NO_PAD)
    );
    let signature = crypto.ecdsa_sign_p256_sha256(&key_pair.private_key, signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        encode_config(signature, URL_SAFE_NO_PAD)
    ))
}

/// `scheme://host[:port]` of a push endpoint, used as the token audience.
pub fn relay_origin(endpoint: &str) -> Result<String, VapidError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|_| VapidError::InvalidEndpoint(endpoint.to_string()))?;
    let origin = url.origin();
    if !matches!(url.scheme(), "https" | "http") || !origin.is_tuple() {
        return Err(VapidError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(origin.ascii_serialization())
}

pub fn authorization_header(token: &str, key_pair: &VapidKeyPair) -> String {
    format!("vapid t={token}, k={}", key_pair.public_key_base64url())
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, VapidError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, VapidError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_bytes = key_pair.to_bytes();
    let public_bytes = derive_public_key(&private_bytes)?;

    Ok(VapidCredentials {
        private_key: encode_config(&private_bytes, URL_SAFE_NO_PAD),
        public_key: encode_config(public_bytes, URL_SAFE_NO_PAD),
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

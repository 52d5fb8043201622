use crate::config;

use base64::{URL_SAFE_NO_PAD, encode_config};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Shared bearer token guarding the write routes. Only its digest is kept.
#[derive(Clone)]
pub(crate) struct ApiAuth {
    digest: [u8; 32],
}

impl std::fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiAuth").finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to gather randomness for the API token")]
    Random,
}

impl ApiAuth {
    pub(crate) fn from_config(config: &config::AppConfig) -> Option<Self> {
        config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self {
                digest: digest(token),
            })
    }

    pub(crate) fn verify(&self, presented: &str) -> bool {
        let presented = digest(presented.trim());
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

pub fn generate_api_token() -> Result<String, AuthError> {
    let mut rng = OsRng;
    generate_api_token_with_rng(&mut rng)
}

pub(crate) fn generate_api_token_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|_| AuthError::Random)?;
    Ok(encode_config(bytes, URL_SAFE_NO_PAD))
}

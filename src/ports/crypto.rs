use thiserror::Error;

use crate::types::push::UNCOMPRESSED_POINT_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid P-256 public key")]
    InvalidPublicKey,
    #[error("invalid P-256 private key")]
    InvalidPrivateKey,
    #[error("invalid key or nonce length")]
    InvalidKeyLength,
    #[error("requested {0} bytes of key material, at most 32 are supported")]
    OutputLength(usize),
    #[error("authenticated encryption failed")]
    Encryption,
    #[error("secure random number generator unavailable")]
    Random,
}

/// The primitives the push protocol needs, so the protocol code never touches
/// a concrete crypto library.
pub trait CryptoProvider: Send + Sync + 'static {
    type EcdhSecret: Send;

    fn fill_random(&self, dest: &mut [u8]) -> Result<(), CryptoError>;

    /// Fresh ephemeral P-256 pair; the public half is an uncompressed point.
    fn generate_ecdh_key_pair(
        &self,
    ) -> Result<(Self::EcdhSecret, [u8; UNCOMPRESSED_POINT_LEN]), CryptoError>;

    fn ecdh_derive_bits(
        &self,
        secret: &Self::EcdhSecret,
        peer_public_key: &[u8],
    ) -> Result<[u8; 32], CryptoError>;

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError>;

    /// AES-GCM with a 128-bit tag appended to the ciphertext.
    fn aes_gcm_encrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// ES256 signature in raw `r || s` form.
    fn ecdsa_sign_p256_sha256(
        &self,
        private_key: &[u8],
        message: &[u8],
    ) -> Result<[u8; 64], CryptoError>;
}

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hmac::{Hmac, Mac};
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::ports::{CryptoError, CryptoProvider};
use crate::types::push::UNCOMPRESSED_POINT_LEN;

type HmacSha256 = Hmac<Sha256>;

const GCM_NONCE_LEN: usize = 12;

/// [`CryptoProvider`] backed by the RustCrypto crates and the OS RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    type EcdhSecret = EphemeralSecret;

    fn fill_random(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        OsRng.try_fill_bytes(dest).map_err(|_| CryptoError::Random)
    }

    fn generate_ecdh_key_pair(
        &self,
    ) -> Result<(EphemeralSecret, [u8; UNCOMPRESSED_POINT_LEN]), CryptoError> {
        let secret = EphemeralSecret::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let public_key = point
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok((secret, public_key))
    }

    fn ecdh_derive_bits(
        &self,
        secret: &EphemeralSecret,
        peer_public_key: &[u8],
    ) -> Result<[u8; 32], CryptoError> {
        let peer =
            PublicKey::from_sec1_bytes(peer_public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let shared = secret.diffie_hellman(&peer);
        let mut bits = [0u8; 32];
        bits.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(bits)
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        mac.update(data);
        let mut tag = [0u8; 32];
        tag.copy_from_slice(mac.finalize().into_bytes().as_slice());
        Ok(tag)
    }

    fn aes_gcm_encrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != GCM_NONCE_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)
    }

    fn ecdsa_sign_p256_sha256(
        &self,
        private_key: &[u8],
        message: &[u8],
    ) -> Result<[u8; 64], CryptoError> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let signature: Signature = signing_key.sign(message);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(signature.to_bytes().as_slice());
        Ok(raw)
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use p256::ecdsa::VerifyingKey;
    use p256::ecdsa::signature::Verifier;

    #[test]
    fn generate_ecdh_key_pair__should_return_uncompressed_point() {
        // When
        let (_, public_key) = RustCryptoProvider
            .generate_ecdh_key_pair()
            .expect("key pair");

        // Then
        assert_eq!(public_key[0], 0x04);
        assert!(PublicKey::from_sec1_bytes(&public_key).is_ok());
    }

    #[test]
    fn ecdh_derive_bits__should_agree_with_peer() {
        // Given
        let provider = RustCryptoProvider;
        let (secret, public_key) = provider.generate_ecdh_key_pair().expect("key pair");
        let peer = p256::SecretKey::random(&mut OsRng);
        let peer_public = peer.public_key().to_encoded_point(false);

        // When
        let ours = provider
            .ecdh_derive_bits(&secret, peer_public.as_bytes())
            .expect("derive bits");

        // Then
        let their_view = PublicKey::from_sec1_bytes(&public_key).expect("public key");
        let theirs = p256::ecdh::diffie_hellman(peer.to_nonzero_scalar(), their_view.as_affine());
        assert_eq!(ours.as_slice(), theirs.raw_secret_bytes().as_slice());
    }

    #[test]
    fn ecdh_derive_bits__should_reject_malformed_peer_key() {
        // Given
        let provider = RustCryptoProvider;
        let (secret, _) = provider.generate_ecdh_key_pair().expect("key pair");

        // Then
        assert!(matches!(
            provider.ecdh_derive_bits(&secret, &[4u8; 65]),
            Err(CryptoError::InvalidPublicKey)
        ));
    }

    #[test]
    fn hmac_sha256__should_match_rfc4231_case_two() {
        // When
        let tag = RustCryptoProvider
            .hmac_sha256(b"Jefe", b"what do ya want for nothing?")
            .expect("hmac");

        // Then
        let expected = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(tag, expected);
    }

    #[test]
    fn aes_gcm_encrypt__should_append_tag_and_reject_bad_lengths() {
        // Given
        let provider = RustCryptoProvider;

        // When
        let ciphertext = provider
            .aes_gcm_encrypt(&[1u8; 16], &[2u8; 12], b"hello")
            .expect("encrypt");

        // Then
        assert_eq!(ciphertext.len(), 5 + 16);
        assert!(provider.aes_gcm_encrypt(&[1u8; 32], &[2u8; 12], b"x").is_err());
        assert!(provider.aes_gcm_encrypt(&[1u8; 16], &[2u8; 16], b"x").is_err());
    }

    #[test]
    fn ecdsa_sign_p256_sha256__should_produce_verifiable_raw_signature() {
        // Given
        let signing_key = SigningKey::random(&mut OsRng);
        let private_key = signing_key.to_bytes();

        // When
        let raw = RustCryptoProvider
            .ecdsa_sign_p256_sha256(private_key.as_slice(), b"header.claims")
            .expect("sign");

        // Then
        let signature = Signature::from_slice(&raw).expect("raw signature");
        let verifying_key = VerifyingKey::from(&signing_key);
        assert!(verifying_key.verify(b"header.claims", &signature).is_ok());
    }
}

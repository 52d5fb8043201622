use crate::ports::{CryptoError, CryptoProvider};

/// Largest output a single HMAC-SHA256 expansion block can produce.
pub(crate) const MAX_OUTPUT_LEN: usize = 32;

/// HKDF-SHA256 extract-and-expand limited to one expansion block
/// (`T(1) = HMAC(PRK, info || 0x01)`).
pub(crate) fn hkdf<C: CryptoProvider>(
    crypto: &C,
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>, CryptoError> {
    if len > MAX_OUTPUT_LEN {
        return Err(CryptoError::OutputLength(len));
    }
    let prk = crypto.hmac_sha256(salt, ikm)?;
    let mut block = Vec::with_capacity(info.len() + 1);
    block.extend_from_slice(info);
    block.push(0x01);
    let okm = crypto.hmac_sha256(&prk, &block)?;
    Ok(okm[..len].to_vec())
}

//! The self-describing IV header prefixed to every encrypted stream
//!
//! Wire format: `[4-byte little-endian IV length][IV bytes][ciphertext]`.
//! This prefix is persisted and transmitted, so it must stay bit-exact for
//! interop between the encrypt and decrypt adapters.

use crate::error::{CipherError, Result};

/// AES-CBC initialization vector length in bytes
pub const IV_LEN: usize = 16;

/// Total header length: the 4-byte length prefix plus the IV
pub const HEADER_LEN: usize = 4 + IV_LEN;

/// Encode the IV header
#[must_use]
pub fn encode_iv_header(iv: &[u8; IV_LEN]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&(IV_LEN as u32).to_le_bytes());
    header[4..].copy_from_slice(iv);
    header
}

/// Parse the IV header from the start of `bytes`
///
/// Returns the IV and the number of header bytes consumed.
///
/// # Errors
///
/// Returns `CipherError::InvalidHeader` when `bytes` is too short or the
/// declared IV length is not the AES block size.
pub fn parse_iv_header(bytes: &[u8]) -> Result<([u8; IV_LEN], usize)> {
    if bytes.len() < 4 {
        return Err(CipherError::InvalidHeader(
            "stream ended before the IV length prefix".into(),
        ));
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if declared != IV_LEN {
        return Err(CipherError::InvalidHeader(format!(
            "declared IV length {declared}, expected {IV_LEN}"
        )));
    }
    if bytes.len() < HEADER_LEN {
        return Err(CipherError::InvalidHeader(
            "stream ended before the IV bytes".into(),
        ));
    }
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&bytes[4..HEADER_LEN]);
    Ok((iv, HEADER_LEN))
}

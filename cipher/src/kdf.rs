//! Password-based key derivation for the stream ciphers

use crate::error::{CipherError, Result};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ROUNDS: u32 = 10_000;

/// Derive a 256-bit key from a secret and salt via PBKDF2-HMAC-SHA256
///
/// The same secret and salt always derive the same key, which is what lets
/// the decrypt side reconstruct it; only the IV travels with the ciphertext.
///
/// # Errors
///
/// Returns `CipherError::KeyDerivation` if the secret or salt is empty.
pub fn derive_key(secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if secret.is_empty() {
        return Err(CipherError::KeyDerivation("secret must not be empty".into()));
    }
    if salt.is_empty() {
        return Err(CipherError::KeyDerivation("salt must not be empty".into()));
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ROUNDS, &mut key[..]);
    Ok(key)
}

//! AES-256-CBC primitives: one-shot transforms and incremental streaming ones

use crate::error::{CipherError, Result};
use crate::format::IV_LEN;
use crate::kdf::KEY_LEN;
use aes::cipher::block_padding::{NoPadding, Padding, Pkcs7};
use aes::cipher::consts::U16;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block length in bytes
pub(crate) const BLOCK_LEN: usize = 16;

/// Generate a fresh random initialization vector
#[must_use]
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// One-shot AES-256-CBC encryption with PKCS#7 padding
#[must_use]
pub fn encrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// One-shot AES-256-CBC decryption
///
/// Tries PKCS#7 unpadding first; when that fails the same ciphertext is
/// decrypted again with padding disabled, a compatibility fallback for
/// plaintexts originally produced without final-block padding. Only the
/// unpadding interpretation changes, never the key or IV.
///
/// # Errors
///
/// Returns `CipherError::Decryption` when the ciphertext length is not a
/// multiple of the cipher block size.
pub fn decrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CipherError::Decryption(format!(
            "ciphertext length {} is not a multiple of the {BLOCK_LEN}-byte block size",
            ciphertext.len()
        )));
    }
    match Aes256CbcDec::new(key.into(), iv.into()).decrypt_padded_vec_mut::<Pkcs7>(ciphertext) {
        Ok(plaintext) => Ok(plaintext),
        Err(_) => {
            tracing::debug!("PKCS#7 unpadding failed, retrying with padding disabled");
            Aes256CbcDec::new(key.into(), iv.into())
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| CipherError::Decryption("block decryption failed".into()))
        }
    }
}

/// Incremental AES-256-CBC encryptor
///
/// Feeds arbitrary-sized chunks through [`update`](Self::update), carrying a
/// partial block between calls; [`finish`](Self::finish) emits the final
/// PKCS#7-padded block. At most one block of plaintext is held at a time.
pub struct CbcEncryptStream {
    encryptor: Aes256CbcEnc,
    carry: Vec<u8>,
}

impl CbcEncryptStream {
    /// Start an encryption stream with the given key and IV
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            encryptor: Aes256CbcEnc::new(key.into(), iv.into()),
            carry: Vec::with_capacity(BLOCK_LEN),
        }
    }

    /// Encrypt all full blocks available so far, keeping the remainder
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(input);

        let processable = buf.len() - buf.len() % BLOCK_LEN;
        self.carry = buf.split_off(processable);
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            self.encryptor
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        buf
    }

    /// Pad and encrypt the trailing partial block
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.encryptor.encrypt_padded_vec_mut::<Pkcs7>(&self.carry)
    }
}

/// Incremental AES-256-CBC decryptor
///
/// Holds back the final ciphertext block until [`finish`](Self::finish),
/// where the unpadding interpretation is decided: PKCS#7 first, raw block
/// as the compatibility fallback.
pub struct CbcDecryptStream {
    decryptor: Aes256CbcDec,
    carry: Vec<u8>,
}

impl CbcDecryptStream {
    /// Start a decryption stream with the given key and IV
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            decryptor: Aes256CbcDec::new(key.into(), iv.into()),
            carry: Vec::with_capacity(2 * BLOCK_LEN),
        }
    }

    /// Decrypt the full blocks available so far, holding back the candidate
    /// final block
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.carry.extend_from_slice(input);
        if self.carry.len() <= BLOCK_LEN {
            return Vec::new();
        }

        let mut processable = self.carry.len() - BLOCK_LEN;
        processable -= processable % BLOCK_LEN;
        if processable == 0 {
            return Vec::new();
        }

        let rest = self.carry.split_off(processable);
        let mut out = std::mem::replace(&mut self.carry, rest);
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out
    }

    /// Decrypt and unpad the held-back final block
    ///
    /// # Errors
    ///
    /// Returns `CipherError::Decryption` when the total ciphertext length was
    /// not a multiple of the cipher block size.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        match self.carry.len() {
            0 => Ok(Vec::new()),
            BLOCK_LEN => {
                let mut block: GenericArray<u8, U16> = GenericArray::clone_from_slice(&self.carry);
                self.decryptor.decrypt_block_mut(&mut block);
                match Pkcs7::unpad(&block) {
                    Ok(unpadded) => Ok(unpadded.to_vec()),
                    // Padding-disabled fallback: the final block is plaintext
                    Err(_) => Ok(block.to_vec()),
                }
            }
            len => Err(CipherError::Decryption(format!(
                "ciphertext ended with a {len}-byte fragment, not a whole block"
            ))),
        }
    }
}

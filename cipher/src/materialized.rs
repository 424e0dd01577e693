//! Fully-buffered encryption adapters
//!
//! These transform the entire source up front and expose the result as a
//! read-only, rewindable in-memory stream. Use them when the payload fits
//! comfortably in memory and random re-reads matter more than footprint;
//! for large payloads use [`crate::connected_stream`] instead.

use crate::aes;
use crate::error::Result;
use crate::format::{encode_iv_header, parse_iv_header, HEADER_LEN};
use crate::kdf::derive_key;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A fully-encrypted payload exposed as a rewindable [`AsyncRead`]
///
/// The byte sequence is `[4-byte LE IV length][IV][ciphertext]`, exactly
/// what [`DecryptedStream`] and the connected decrypt adapter consume.
pub struct EncryptedStream {
    cursor: Cursor<Vec<u8>>,
}

impl EncryptedStream {
    /// Drain `source` to the end, encrypt it, and prefix the IV header
    ///
    /// A fresh random IV is generated per call, so two encryptions of the
    /// same plaintext produce different bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when reading the source fails or the key cannot be
    /// derived from the secret and salt.
    pub async fn create<R>(mut source: R, secret: &[u8], salt: &[u8]) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let key = derive_key(secret, salt)?;
        let mut plaintext = Vec::new();
        source.read_to_end(&mut plaintext).await?;

        let iv = aes::generate_iv();
        let ciphertext = aes::encrypt(&key, &iv, &plaintext);

        let mut bytes = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        bytes.extend_from_slice(&encode_iv_header(&iv));
        bytes.extend_from_slice(&ciphertext);
        tracing::trace!(
            plaintext_len = plaintext.len(),
            encrypted_len = bytes.len(),
            "materialized encrypted stream"
        );
        Ok(Self {
            cursor: Cursor::new(bytes),
        })
    }

    /// Total length of the encrypted stream, header included
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    /// Whether the stream holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Current read position
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Rewind to the start so the stream can be read again
    pub fn rewind(&mut self) {
        self.cursor.set_position(0);
    }

    /// Consume the stream, returning the encrypted bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl AsyncRead for EncryptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

/// A fully-decrypted payload exposed as a rewindable [`AsyncRead`]
pub struct DecryptedStream {
    cursor: Cursor<Vec<u8>>,
}

impl DecryptedStream {
    /// Drain an encrypted `source`, parse its IV header, and decrypt
    ///
    /// With `content_length` set, exactly that many bytes are taken from the
    /// source; otherwise the source is drained to the end. The length covers
    /// the whole encrypted stream, header included.
    ///
    /// # Errors
    ///
    /// Returns an error when reading the source fails, the IV header is
    /// malformed, or the ciphertext cannot be decrypted.
    pub async fn create<R>(
        source: R,
        secret: &[u8],
        salt: &[u8],
        content_length: Option<u64>,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let key = derive_key(secret, salt)?;
        let mut encrypted = Vec::new();
        match content_length {
            Some(limit) => {
                source.take(limit).read_to_end(&mut encrypted).await?;
            }
            None => {
                let mut source = source;
                source.read_to_end(&mut encrypted).await?;
            }
        }

        let (iv, consumed) = parse_iv_header(&encrypted)?;
        let plaintext = aes::decrypt(&key, &iv, &encrypted[consumed..])?;
        tracing::trace!(
            encrypted_len = encrypted.len(),
            plaintext_len = plaintext.len(),
            "materialized decrypted stream"
        );
        Ok(Self {
            cursor: Cursor::new(plaintext),
        })
    }

    /// Length of the decrypted payload
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Current read position
    #[must_use]
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Rewind to the start so the payload can be read again
    pub fn rewind(&mut self) {
        self.cursor.set_position(0);
    }

    /// Consume the stream, returning the plaintext
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl AsyncRead for DecryptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

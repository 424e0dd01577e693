//! Streaming encryption adapters over the piped transport
//!
//! A connected stream spawns a pump task that drains the source through an
//! incremental AES transform into a [`PipeWriter`], while the caller reads
//! from the paired [`PipeReader`]. Backpressure from the reader suspends the
//! pump, so at most one transformed chunk sits in memory beyond the pipe's
//! configured capacity.

use crate::aes::{CbcDecryptStream, CbcEncryptStream};
use crate::error::{CipherError, Result};
use crate::format::{encode_iv_header, parse_iv_header, HEADER_LEN};
use crate::kdf::derive_key;
use pipestream_pipe::{
    PipeError, PipeReader, PipeState, PipeWriter, PipedStreamManager, PipedStreamOptions,
};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Which direction a connected stream transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Plaintext source, encrypted output with the IV header prefixed
    Encrypt,
    /// Encrypted source starting with the IV header, plaintext output
    Decrypt,
}

/// Connect `source` to a spawned crypto pump and return the plaintext or
/// ciphertext side as a [`PipeReader`]
///
/// The pump owns the source and the pipe's writer; dropping or closing the
/// returned reader closes the pipe and stops the pump on its next write.
/// A pump failure faults the pipe, so the reader observes the error rather
/// than a truncated stream.
///
/// # Errors
///
/// Returns an error when the options fail validation or the key cannot be
/// derived from the secret and salt.
pub fn connected_stream<R>(
    mode: EncryptionMode,
    source: R,
    secret: &[u8],
    salt: &[u8],
    options: Option<PipedStreamOptions>,
) -> Result<PipeReader>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let key = derive_key(secret, salt)?;
    let manager = PipedStreamManager::new(options.unwrap_or_default())?;
    let mut writer = manager.create_writer(true)?;
    let reader = manager.create_reader()?;
    let chunk_size = manager.options().block_size;

    tokio::spawn(async move {
        let result = match mode {
            EncryptionMode::Encrypt => pump_encrypt(source, &mut writer, &key, chunk_size).await,
            EncryptionMode::Decrypt => pump_decrypt(source, &mut writer, &key, chunk_size).await,
        };
        // Fault before the writer drops so the error wins over the close.
        if let Err(error) = result {
            tracing::debug!(%error, "connected stream pump failed");
            manager.fault_pipe(Some(PipeError::Producer(error.to_string())));
        }
    });

    Ok(reader)
}

async fn pump_encrypt<R>(
    mut source: R,
    writer: &mut PipeWriter,
    key: &[u8; crate::kdf::KEY_LEN],
    chunk_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let iv = crate::aes::generate_iv();
    let mut transform = CbcEncryptStream::new(key, &iv);
    writer.write(&encode_iv_header(&iv)).await?;

    let mut chunk = vec![0u8; chunk_size];
    loop {
        if writer.state() != PipeState::Open {
            return Ok(());
        }
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let ciphertext = transform.update(&chunk[..n]);
        if !ciphertext.is_empty() {
            writer.write(&ciphertext).await?;
        }
    }
    writer.write(&transform.finish()).await?;
    writer.close().await?;
    Ok(())
}

async fn pump_decrypt<R>(
    mut source: R,
    writer: &mut PipeWriter,
    key: &[u8; crate::kdf::KEY_LEN],
    chunk_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    source
        .read_exact(&mut header)
        .await
        .map_err(|e| CipherError::InvalidHeader(format!("reading the IV header: {e}")))?;
    let (iv, _) = parse_iv_header(&header)?;
    let mut transform = CbcDecryptStream::new(key, &iv);

    let mut chunk = vec![0u8; chunk_size];
    loop {
        if writer.state() != PipeState::Open {
            return Ok(());
        }
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let plaintext = transform.update(&chunk[..n]);
        if !plaintext.is_empty() {
            writer.write(&plaintext).await?;
        }
    }
    let tail = transform.finish()?;
    if !tail.is_empty() {
        writer.write(&tail).await?;
    }
    writer.close().await?;
    Ok(())
}

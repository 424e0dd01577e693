//! Byte-oriented writer over the pipe transport

use crate::buffer::{Block, BlockPool};
use crate::core::{PipeCore, PipeState};
use crate::error::{PipeError, Result};
use std::sync::Arc;

/// The single writer of a pipe
///
/// Accumulates bytes into the current block and hands full blocks to the
/// bounded channel, suspending on backpressure. Created once per pipe via
/// [`PipedStreamManager::create_writer`](crate::PipedStreamManager::create_writer).
///
/// A send failure (timeout or fault) faults the pipe so the reader side
/// observes a deterministic error; whether the failure is also raised to the
/// caller is controlled by `throws_on_failed_write` at creation time.
pub struct PipeWriter {
    core: Arc<PipeCore>,
    pool: BlockPool,
    current: Option<Block>,
    length: u64,
    auto_flush: bool,
    throws_on_failed_write: bool,
}

impl PipeWriter {
    pub(crate) fn new(
        core: Arc<PipeCore>,
        pool: BlockPool,
        auto_flush: bool,
        throws_on_failed_write: bool,
    ) -> Self {
        Self {
            core,
            pool,
            current: None,
            length: 0,
            auto_flush,
            throws_on_failed_write,
        }
    }

    /// Total bytes accepted by this writer
    #[must_use]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// True when no bytes have been written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current lifecycle state of the underlying pipe
    #[must_use]
    pub fn state(&self) -> PipeState {
        self.core.state()
    }

    /// Write `buf` into the pipe, suspending while the channel is full
    ///
    /// Bytes are split into block-sized chunks; full blocks are sent through
    /// the pipe and a fresh block is started. The loop stops early when the
    /// pipe has already closed (no further bytes accepted, no error).
    ///
    /// # Errors
    ///
    /// With `throws_on_failed_write`, a send failure (backpressure timeout or
    /// fault) is returned after faulting the pipe; without it the failure is
    /// silent and the stream degrades to a truncated, faulted one.
    pub async fn write(&mut self, mut buf: &[u8]) -> Result<()> {
        self.core.notify_write(buf.len());

        while !buf.is_empty() {
            match self.core.state() {
                PipeState::Open => {}
                PipeState::Closed => break,
                PipeState::Faulted => {
                    if self.throws_on_failed_write {
                        return Err(self.core.fault_error());
                    }
                    break;
                }
            }

            let block = self.current.get_or_insert_with(|| self.pool.acquire());
            let n = block.remaining().min(buf.len());
            block.write(&buf[..n])?;
            self.length += n as u64;
            buf = &buf[n..];

            if block.is_full() && !self.send_current().await? {
                break;
            }
        }

        if self.auto_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the partially filled current block, if any
    ///
    /// # Errors
    ///
    /// Same failure policy as [`write`](Self::write).
    pub async fn flush(&mut self) -> Result<()> {
        self.send_current().await.map(|_| ())
    }

    /// Flush remaining buffered bytes, then close the pipe
    ///
    /// The pipe is closed even when the final flush fails, so a blocked
    /// reader is always released.
    ///
    /// # Errors
    ///
    /// Returns the flush failure, after the pipe has been closed.
    pub async fn close(&mut self) -> Result<()> {
        let flushed = self.flush().await;
        self.core.close();
        flushed
    }

    /// Sends the current block; `Ok(false)` means the pipe stopped accepting.
    async fn send_current(&mut self) -> Result<bool> {
        let Some(block) = self.current.take() else {
            return Ok(true);
        };
        if block.is_empty() {
            return Ok(true);
        }

        match self.core.send(block).await {
            Ok(accepted) => Ok(accepted),
            Err(error) => {
                if self.core.state() == PipeState::Open {
                    self.core.fault(error.clone());
                }
                if self.throws_on_failed_write {
                    Err(error)
                } else {
                    tracing::debug!(%error, "pipe write failed silently");
                    Ok(false)
                }
            }
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        // Buffered bytes that were never flushed are lost; the close still
        // runs so a blocked reader is released.
        self.core.close();
    }
}

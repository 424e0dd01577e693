//! Fixed-capacity byte blocks and the recycling pool behind them

use crate::error::{PipeError, Result};
use tokio::sync::mpsc;

/// A fixed-capacity byte block with a write cursor
///
/// The unit of data moved through the pipe. Blocks are created by a
/// [`BlockPool`] and handed back for reuse once a reader has drained them.
#[derive(Debug)]
pub(crate) struct Block {
    data: Box<[u8]>,
    written: usize,
}

impl Block {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            written: 0,
        }
    }

    /// Fixed capacity of the block in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Remaining writable capacity
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.written
    }

    /// True when the write cursor has reached capacity
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.written == self.data.len()
    }

    /// True when nothing has been written since the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Append `bytes` at the write cursor
    ///
    /// # Errors
    ///
    /// Returns `PipeError::Capacity` if the bytes do not fit; the block is
    /// left unchanged in that case.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.written + bytes.len() > self.data.len() {
            return Err(PipeError::Capacity {
                capacity: self.data.len(),
                written: self.written,
                requested: bytes.len(),
            });
        }
        self.data[self.written..self.written + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        Ok(())
    }

    /// Copy `dest.len()` bytes starting at `offset` into `dest`
    ///
    /// # Errors
    ///
    /// Returns `PipeError::ReadOutOfRange` if the range extends past the
    /// written region. Stale bytes beyond the write cursor are never exposed.
    pub fn read_at(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        if offset + dest.len() > self.written {
            return Err(PipeError::ReadOutOfRange {
                offset,
                count: dest.len(),
                written: self.written,
            });
        }
        dest.copy_from_slice(&self.data[offset..offset + dest.len()]);
        Ok(())
    }

    /// The written region of the block
    #[must_use]
    pub fn as_written(&self) -> &[u8] {
        &self.data[..self.written]
    }

    /// Rewind the write cursor; the underlying bytes are not cleared
    pub fn reset(&mut self) {
        self.written = 0;
    }
}

/// Recycling pool of [`Block`]s, single-owner on the writer's call path
///
/// Drained blocks come back from the reader over a bounded recycle channel
/// sized `max_blocks + 2`: the in-flight blocks plus one being filled and one
/// being drained. `acquire` reuses a recycled block when one is available and
/// allocates otherwise, so the same physical buffer is never live in two
/// blocks at once — ownership moves it writer → channel → reader → pool.
#[derive(Debug)]
pub(crate) struct BlockPool {
    block_size: usize,
    returns: mpsc::Receiver<Block>,
}

/// Reader-side handle returning drained blocks to the pool
#[derive(Debug, Clone)]
pub(crate) struct BlockRecycler {
    returns: mpsc::Sender<Block>,
}

pub(crate) fn block_pool(block_size: usize, max_blocks: usize) -> (BlockPool, BlockRecycler) {
    let (tx, rx) = mpsc::channel(max_blocks + 2);
    (
        BlockPool {
            block_size,
            returns: rx,
        },
        BlockRecycler { returns: tx },
    )
}

impl BlockPool {
    /// Hand out a reset recycled block, or a freshly allocated one
    pub(crate) fn acquire(&mut self) -> Block {
        match self.returns.try_recv() {
            Ok(mut block) => {
                block.reset();
                block
            }
            Err(_) => Block::new(self.block_size),
        }
    }
}

impl BlockRecycler {
    /// Return a drained block; dropped silently if the pool ring is full
    pub(crate) fn recycle(&self, block: Block) {
        let _ = self.returns.try_send(block);
    }
}

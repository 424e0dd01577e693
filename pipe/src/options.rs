//! Configuration surface for the piped-stream transport

use crate::error::{PipeError, Result};
use std::time::Duration;

/// Default block size: 32 KiB
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Default bounded channel capacity in blocks
pub const DEFAULT_MAX_BLOCKS: usize = 1;

/// Options for a [`PipedStreamManager`](crate::PipedStreamManager)
///
/// Validated eagerly at manager construction; see [`PipedStreamOptions::validate`].
#[derive(Clone, Debug)]
pub struct PipedStreamOptions {
    /// Fixed capacity of each block moved through the pipe
    pub block_size: usize,
    /// Capacity of the bounded channel, in blocks
    pub max_blocks: usize,
    /// Allow unlimited readers, fanned out through a multiplexer
    pub multiplexed: bool,
    /// Flush the partially filled current block after every write call
    pub auto_flush: bool,
    /// Timeout applied to each send into a full pipe
    pub write_timeout: Option<Duration>,
    /// Timeout applied to each receive from an empty pipe
    pub read_timeout: Option<Duration>,
}

impl Default for PipedStreamOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: DEFAULT_MAX_BLOCKS,
            multiplexed: false,
            auto_flush: false,
            write_timeout: None,
            read_timeout: None,
        }
    }
}

impl PipedStreamOptions {
    /// Create options with the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the bounded channel capacity in blocks
    #[must_use]
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Enable or disable multiplexed fan-out reading
    #[must_use]
    pub fn with_multiplexed(mut self, multiplexed: bool) -> Self {
        self.multiplexed = multiplexed;
        self
    }

    /// Enable or disable auto-flush after every write call
    #[must_use]
    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    /// Set the per-send timeout
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the per-receive timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Validate the options
    ///
    /// # Errors
    ///
    /// Returns `PipeError::Config` if the block size or channel capacity is
    /// zero, or a configured timeout is zero or exceeds `i32::MAX` milliseconds.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(PipeError::Config("block_size must be at least 1".into()));
        }
        if self.max_blocks == 0 {
            return Err(PipeError::Config("max_blocks must be at least 1".into()));
        }
        for (name, timeout) in [
            ("write_timeout", self.write_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if let Some(timeout) = timeout {
                if timeout.is_zero() || timeout.as_millis() > i32::MAX as u128 {
                    return Err(PipeError::Config(format!(
                        "{name} must be in (0, {}] milliseconds",
                        i32::MAX
                    )));
                }
            }
        }
        Ok(())
    }
}

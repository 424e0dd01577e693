//! # Pipestream Pipe
//!
//! In-process piped byte stream: a single writer pushes fixed-size blocks
//! through a bounded channel to a reader, with backpressure, configurable
//! timeouts, fault propagation, and optional fan-out multiplexing to any
//! number of independent readers.
//!
//! ```no_run
//! use pipestream_pipe::{PipedStreamManager, PipedStreamOptions};
//! use tokio::io::AsyncReadExt;
//!
//! # async fn example() -> pipestream_pipe::Result<()> {
//! let manager = PipedStreamManager::new(PipedStreamOptions::new().with_block_size(4096))?;
//! let mut writer = manager.create_writer(true)?;
//! let mut reader = manager.create_reader()?;
//!
//! tokio::spawn(async move {
//!     let _ = writer.write(b"hello").await;
//!     let _ = writer.close().await;
//! });
//!
//! let mut received = Vec::new();
//! reader.read_to_end(&mut received).await.ok();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod buffer;
mod core;
mod multiplexer;

pub mod error;
pub mod options;

mod manager;
mod reader;
mod writer;

pub use crate::core::PipeState;
pub use error::{PipeError, Result};
pub use manager::PipedStreamManager;
pub use options::{PipedStreamOptions, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BLOCKS};
pub use reader::PipeReader;
pub use writer::PipeWriter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        PipeError, PipeReader, PipeState, PipeWriter, PipedStreamManager, PipedStreamOptions,
        Result,
    };
}

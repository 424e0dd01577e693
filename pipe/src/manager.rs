//! Pipe ownership and lifecycle: writer/reader creation, close and fault

use crate::buffer::{block_pool, BlockPool, BlockRecycler};
use crate::core::{PipeCore, PipeState};
use crate::error::{PipeError, Result};
use crate::multiplexer::Multiplexer;
use crate::options::PipedStreamOptions;
use crate::reader::PipeReader;
use crate::writer::PipeWriter;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owns one bounded pipe and mints its writer and reader(s)
///
/// At most one writer may ever be created; at most one reader unless the
/// options enable multiplexing, in which case unlimited readers are fanned
/// out through a lazily constructed [`Multiplexer`], each backed by its own
/// independent pipe.
///
/// Cloning is cheap and shares the same pipe.
#[derive(Clone)]
pub struct PipedStreamManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    options: PipedStreamOptions,
    core: Arc<PipeCore>,
    pool: Mutex<Option<BlockPool>>,
    recycler: Mutex<Option<BlockRecycler>>,
    writer_created: AtomicBool,
    reader_created: AtomicBool,
    multiplexer: OnceCell<Multiplexer>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PipedStreamManager {
    /// Create a manager for one logical stream transport
    ///
    /// # Errors
    ///
    /// Returns `PipeError::Config` if the options fail validation.
    pub fn new(options: PipedStreamOptions) -> Result<Self> {
        options.validate()?;
        let core = Arc::new(PipeCore::new(&options));
        let (pool, recycler) = block_pool(options.block_size, options.max_blocks);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                options,
                core,
                pool: Mutex::new(Some(pool)),
                recycler: Mutex::new(Some(recycler)),
                writer_created: AtomicBool::new(false),
                reader_created: AtomicBool::new(false),
                multiplexer: OnceCell::new(),
            }),
        })
    }

    /// The options this manager was created with
    #[must_use]
    pub fn options(&self) -> &PipedStreamOptions {
        &self.inner.options
    }

    /// Current lifecycle state of the pipe
    #[must_use]
    pub fn state(&self) -> PipeState {
        self.inner.core.state()
    }

    /// Create the pipe's single writer
    ///
    /// With `throws_on_failed_write`, send failures are raised to the caller
    /// after faulting the pipe; without it they silently fault the pipe.
    ///
    /// # Errors
    ///
    /// Returns `PipeError::WriterAlreadyCreated` on every call after the first.
    pub fn create_writer(&self, throws_on_failed_write: bool) -> Result<PipeWriter> {
        if self.inner.writer_created.swap(true, Ordering::SeqCst) {
            return Err(PipeError::WriterAlreadyCreated);
        }
        let pool = lock(&self.inner.pool)
            .take()
            .ok_or(PipeError::WriterAlreadyCreated)?;
        Ok(PipeWriter::new(
            Arc::clone(&self.inner.core),
            pool,
            self.inner.options.auto_flush,
            throws_on_failed_write,
        ))
    }

    /// Create a reader
    ///
    /// On a non-multiplexed pipe this succeeds exactly once. On a multiplexed
    /// pipe the first call consumes the pipe's own reader to start the
    /// multiplexer, and every call (including the first) returns a fresh
    /// downstream reader observing the identical byte sequence.
    ///
    /// # Errors
    ///
    /// Returns `PipeError::ReaderAlreadyCreated` on a second call for a
    /// non-multiplexed pipe.
    pub fn create_reader(&self) -> Result<PipeReader> {
        if self.inner.options.multiplexed {
            let multiplexer = self.inner.multiplexer.get_or_try_init(|| {
                let upstream = self.take_reader()?;
                Ok::<_, PipeError>(Multiplexer::new(upstream, &self.inner.options))
            })?;
            multiplexer.create_reader()
        } else {
            self.take_reader()
        }
    }

    /// Gracefully complete the pipe; idempotent, first caller wins
    ///
    /// Pending receives drain the buffered blocks and then observe a clean
    /// end-of-stream; a blocked writer is released.
    pub fn close_pipe(&self) -> bool {
        self.inner.core.close()
    }

    /// Fault the pipe; idempotent, first caller wins
    ///
    /// Buffered blocks still drain, then every pending and future receive
    /// observes the error. Without an explicit error the fault defaults to
    /// [`PipeError::UnexpectedEndOfStream`].
    pub fn fault_pipe(&self, error: Option<PipeError>) -> bool {
        self.inner
            .core
            .fault(error.unwrap_or(PipeError::UnexpectedEndOfStream))
    }

    /// Observe every write call with its byte count, before backpressure
    pub fn on_write(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        self.inner.core.set_on_write(Box::new(hook));
    }

    /// Observe every read call with the byte count served
    pub fn on_read(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        self.inner.core.set_on_read(Box::new(hook));
    }

    /// The pipe's own single reader, enforced by a one-shot flag.
    fn take_reader(&self) -> Result<PipeReader> {
        if self.inner.reader_created.swap(true, Ordering::SeqCst) {
            return Err(PipeError::ReaderAlreadyCreated);
        }
        let receiver = self
            .inner
            .core
            .take_receiver()
            .ok_or(PipeError::ReaderAlreadyCreated)?;
        let recycler = lock(&self.inner.recycler)
            .take()
            .ok_or(PipeError::ReaderAlreadyCreated)?;
        Ok(PipeReader::new(
            Arc::clone(&self.inner.core),
            receiver,
            recycler,
        ))
    }
}

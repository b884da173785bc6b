use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::Result;

/// Size of the chunks descriptor backed decompressors read at once.
pub const INPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Sink side of a compression session.
///
/// One thread drives a compressor at a time. Dropping a compressor that was
/// never closed still releases its sink.
pub trait Compressor: Send + Debug {
    /// Compress and store all of `data`, or fail. Nothing is counted on failure.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release the sink. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Bytes written to the sink so far.
    fn file_size(&self) -> u64 {
        0
    }
}

/// Progress of a read session, shared with monitoring threads.
///
/// All fields use relaxed atomics: they are for reporting only and never
/// order anything on the read path.
#[derive(Debug, Default)]
pub struct ReadProgress {
    file_size: AtomicU64,
    offset: AtomicU64,
    want_buffered_pages_removed: AtomicBool,
}

impl ReadProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Size of the source, 0 if unknown.
    pub fn file_size(&self) -> u64 {
        self.file_size.load(Ordering::Relaxed)
    }

    pub fn set_file_size(&self, size: u64) {
        self.file_size.store(size, Ordering::Relaxed);
    }

    /// Bytes of the source consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }

    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::Relaxed);
    }

    pub fn want_buffered_pages_removed(&self) -> bool {
        self.want_buffered_pages_removed.load(Ordering::Relaxed)
    }

    pub fn set_want_buffered_pages_removed(&self, value: bool) {
        self.want_buffered_pages_removed
            .store(value, Ordering::Relaxed);
    }
}

/// Source side of a compression session.
pub trait Decompressor: Send + Debug {
    /// Next chunk of decompressed data. An empty chunk means end of stream,
    /// and every later call returns empty again.
    fn read(&mut self) -> Result<Bytes>;

    /// Release the source. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// False for placeholders that have no source behind them.
    fn is_real(&self) -> bool {
        true
    }

    fn progress(&self) -> &Arc<ReadProgress>;

    /// A handle other threads can poll while this one reads.
    fn progress_handle(&self) -> Arc<ReadProgress> {
        self.progress().clone()
    }

    fn file_size(&self) -> u64 {
        self.progress().file_size()
    }

    fn set_file_size(&self, size: u64) {
        self.progress().set_file_size(size);
    }

    fn offset(&self) -> u64 {
        self.progress().offset()
    }

    /// Whether cached pages behind the read position should be dropped.
    fn want_buffered_pages_removed(&self) -> bool {
        self.progress().want_buffered_pages_removed()
    }

    fn set_want_buffered_pages_removed(&self, value: bool) {
        self.progress().set_want_buffered_pages_removed(value);
    }
}

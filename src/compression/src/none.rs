//! Pass-through codec used for uncompressed files.
//!
//! Real codecs are expected to behave like these two types: all-or-nothing
//! writes, empty reads at end of stream, idempotent close, and a drop that
//! releases the descriptor without reporting errors.

use std::os::fd::{AsFd, AsRawFd, IntoRawFd, OwnedFd};
use std::sync::Arc;

use bytes::Bytes;
use nix::errno::Errno;
use osmio_utils::fs;
use snafu::ResultExt;
use tracing::{debug, trace, warn};

use crate::api::{Compressor, Decompressor, INPUT_BUFFER_SIZE, ReadProgress};
use crate::config::{FileCompression, Fsync};
use crate::error::{IoSnafu, Result};
use crate::registry::CompressionRegistry;

/// Register [`FileCompression::None`] with `registry`.
pub fn register_no_compression(registry: &mut CompressionRegistry) -> bool {
    registry.register(
        FileCompression::None,
        |fd, fsync| Ok(Box::new(NoCompressor::new(fd, fsync)) as Box<dyn Compressor>),
        |fd| Ok(Box::new(NoDecompressor::from_fd(fd)) as Box<dyn Decompressor>),
        |buffer| Ok(Box::new(NoDecompressor::from_buffer(buffer)) as Box<dyn Decompressor>),
    )
}

/// Writes data to its descriptor unchanged.
#[derive(Debug)]
pub struct NoCompressor {
    /// `None` once closed.
    fd: Option<OwnedFd>,
    fsync: Fsync,
    file_size: u64,
}

impl NoCompressor {
    pub fn new(fd: OwnedFd, fsync: Fsync) -> Self {
        debug!(fd = fd.as_raw_fd(), %fsync, "open uncompressed output");
        Self {
            fd: Some(fd),
            fsync,
            file_size: 0,
        }
    }

    pub fn fsync(&self) -> Fsync {
        self.fsync
    }
}

impl Compressor for NoCompressor {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let fd = self
            .fd
            .as_ref()
            .ok_or(Errno::EBADF)
            .context(IoSnafu { op: "write" })?;
        fs::reliable_write(fd.as_fd(), data).context(IoSnafu { op: "write" })?;
        self.file_size += data.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };

        // Stdout belongs to the process, leave it open and unsynced.
        if fs::is_stdout(fd.as_fd()) {
            let _ = fd.into_raw_fd();
            return Ok(());
        }

        let raw = fd.as_raw_fd();
        if self.fsync.is_yes() {
            fs::reliable_fsync(fd.as_fd()).context(IoSnafu { op: "fsync" })?;
        }
        fs::reliable_close(fd).context(IoSnafu { op: "close" })?;
        debug!(fd = raw, file_size = self.file_size, "closed uncompressed output");
        Ok(())
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Drop for NoCompressor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close uncompressed output on drop: {}", e);
        }
    }
}

#[derive(Debug)]
enum Source {
    /// `None` once closed.
    Fd(Option<OwnedFd>),
    /// `None` once handed out.
    Buffer(Option<Bytes>),
}

/// Reads data unchanged, either from a descriptor in chunks of
/// [`INPUT_BUFFER_SIZE`] or from a buffer in one piece.
#[derive(Debug)]
pub struct NoDecompressor {
    source: Source,
    offset: u64,
    progress: Arc<ReadProgress>,
}

impl NoDecompressor {
    pub fn from_fd(fd: OwnedFd) -> Self {
        debug!(fd = fd.as_raw_fd(), "open uncompressed input");
        Self {
            source: Source::Fd(Some(fd)),
            offset: 0,
            progress: ReadProgress::new(),
        }
    }

    pub fn from_buffer(buffer: impl Into<Bytes>) -> Self {
        let buffer = buffer.into();
        let progress = ReadProgress::new();
        progress.set_file_size(buffer.len() as u64);
        Self {
            source: Source::Buffer(Some(buffer)),
            offset: 0,
            progress,
        }
    }
}

impl Decompressor for NoDecompressor {
    fn read(&mut self) -> Result<Bytes> {
        let remove_pages = self.want_buffered_pages_removed();
        let chunk = match &mut self.source {
            Source::Buffer(buffer) => buffer.take().unwrap_or_default(),
            Source::Fd(fd) => {
                let fd = fd
                    .as_ref()
                    .ok_or(Errno::EBADF)
                    .context(IoSnafu { op: "read" })?;
                let mut chunk = vec![0u8; INPUT_BUFFER_SIZE];
                if remove_pages && fs::remove_buffered_pages_behind(fd.as_fd(), self.offset) {
                    trace!(offset = self.offset, "dropped buffered pages behind offset");
                }
                let n = fs::reliable_read(fd.as_fd(), &mut chunk).context(IoSnafu { op: "read" })?;
                chunk.truncate(n);
                Bytes::from(chunk)
            }
        };

        self.offset += chunk.len() as u64;
        self.progress.set_offset(self.offset);
        trace!(len = chunk.len(), offset = self.offset, "read uncompressed chunk");
        Ok(chunk)
    }

    fn close(&mut self) -> Result<()> {
        let remove_pages = self.want_buffered_pages_removed();
        if let Source::Fd(fd) = &mut self.source
            && let Some(fd) = fd.take()
        {
            if remove_pages {
                fs::remove_buffered_pages(fd.as_fd());
            }
            let raw = fd.as_raw_fd();
            fs::reliable_close(fd).context(IoSnafu { op: "close" })?;
            debug!(fd = raw, offset = self.offset, "closed uncompressed input");
        }
        Ok(())
    }

    fn progress(&self) -> &Arc<ReadProgress> {
        &self.progress
    }
}

impl Drop for NoDecompressor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close uncompressed input on drop: {}", e);
        }
    }
}

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{Debug, Formatter};
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use bytes::Bytes;
use osmio_utils::fs;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::api::{Compressor, Decompressor};
use crate::config::{Config, FileCompression, Fsync};
use crate::error::{IoSnafu, OpenSnafu, Result, UnsupportedCompressionSnafu};
use crate::none::register_no_compression;

pub type CreateCompressor =
    Box<dyn Fn(OwnedFd, Fsync) -> Result<Box<dyn Compressor>> + Send + Sync>;
pub type CreateDecompressorFd = Box<dyn Fn(OwnedFd) -> Result<Box<dyn Decompressor>> + Send + Sync>;
pub type CreateDecompressorBuffer =
    Box<dyn Fn(Bytes) -> Result<Box<dyn Decompressor>> + Send + Sync>;

struct Callbacks {
    create_compressor: CreateCompressor,
    create_decompressor_fd: CreateDecompressorFd,
    create_decompressor_buffer: CreateDecompressorBuffer,
}

/// Maps each [`FileCompression`] to the constructors of its codec.
///
/// Build one at start-up, let every codec register itself, then share it by
/// reference (or `Arc`) with the readers and writers. Registration needs
/// `&mut self`, so nothing can be registered once lookups are in flight.
pub struct CompressionRegistry {
    callbacks: HashMap<FileCompression, Callbacks>,
}

impl Default for CompressionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CompressionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionRegistry")
            .field("compressions", &self.compressions())
            .finish()
    }
}

impl CompressionRegistry {
    /// A registry that knows [`FileCompression::None`].
    pub fn new() -> Self {
        let mut registry = Self {
            callbacks: HashMap::new(),
        };
        register_no_compression(&mut registry);
        registry
    }

    /// Register the constructors for `compression`.
    ///
    /// Returns false and keeps the existing constructors if `compression` is
    /// already registered.
    pub fn register<C, D, B>(
        &mut self,
        compression: FileCompression,
        create_compressor: C,
        create_decompressor_fd: D,
        create_decompressor_buffer: B,
    ) -> bool
    where
        C: Fn(OwnedFd, Fsync) -> Result<Box<dyn Compressor>> + Send + Sync + 'static,
        D: Fn(OwnedFd) -> Result<Box<dyn Decompressor>> + Send + Sync + 'static,
        B: Fn(Bytes) -> Result<Box<dyn Decompressor>> + Send + Sync + 'static,
    {
        match self.callbacks.entry(compression) {
            Entry::Occupied(_) => {
                warn!(%compression, "compression already registered, keeping the first registration");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Callbacks {
                    create_compressor: Box::new(create_compressor),
                    create_decompressor_fd: Box::new(create_decompressor_fd),
                    create_decompressor_buffer: Box::new(create_decompressor_buffer),
                });
                debug!(%compression, "compression registered");
                true
            }
        }
    }

    pub fn is_registered(&self, compression: FileCompression) -> bool {
        self.callbacks.contains_key(&compression)
    }

    /// Registered compressions in a stable order.
    pub fn compressions(&self) -> Vec<FileCompression> {
        let mut compressions: Vec<_> = self.callbacks.keys().copied().collect();
        compressions.sort();
        compressions
    }

    fn find_callbacks(&self, compression: FileCompression) -> Result<&Callbacks> {
        Ok(self
            .callbacks
            .get(&compression)
            .context(UnsupportedCompressionSnafu { compression })?)
    }

    /// Build a compressor writing to `fd`.
    pub fn create_compressor(
        &self,
        compression: FileCompression,
        fd: OwnedFd,
        fsync: Fsync,
    ) -> Result<Box<dyn Compressor>> {
        let callbacks = self.find_callbacks(compression)?;
        (callbacks.create_compressor)(fd, fsync)
    }

    /// Build a decompressor reading from `fd`. Its file size is taken from
    /// the descriptor before any data is read.
    pub fn create_decompressor(
        &self,
        compression: FileCompression,
        fd: OwnedFd,
    ) -> Result<Box<dyn Decompressor>> {
        let callbacks = self.find_callbacks(compression)?;
        let file_size = fs::file_size(fd.as_fd()).context(IoSnafu { op: "fstat" })?;
        let decompressor = (callbacks.create_decompressor_fd)(fd)?;
        decompressor.set_file_size(file_size);
        Ok(decompressor)
    }

    /// Build a decompressor over an in-memory buffer.
    pub fn create_decompressor_from_buffer(
        &self,
        compression: FileCompression,
        buffer: impl Into<Bytes>,
    ) -> Result<Box<dyn Decompressor>> {
        let callbacks = self.find_callbacks(compression)?;
        let buffer = buffer.into();
        let size = buffer.len() as u64;
        let decompressor = (callbacks.create_decompressor_buffer)(buffer)?;
        decompressor.set_file_size(size);
        Ok(decompressor)
    }

    /// Open `path` (`-` for stdout) and build a compressor for it with the
    /// fsync policy of `config`. Nothing is created if `compression` is not
    /// registered.
    pub fn open_compressor(
        &self,
        compression: FileCompression,
        path: impl AsRef<Path>,
        overwrite: bool,
        config: &Config,
    ) -> Result<Box<dyn Compressor>> {
        let path = path.as_ref();
        let callbacks = self.find_callbacks(compression)?;
        let fd = fs::open_for_writing(path, overwrite).context(OpenSnafu { path })?;
        (callbacks.create_compressor)(fd, config.fsync)
    }

    /// Open `path` (`-` for stdin) and build a decompressor for it with the
    /// page-cache hint of `config` applied.
    pub fn open_decompressor(
        &self,
        compression: FileCompression,
        path: impl AsRef<Path>,
        config: &Config,
    ) -> Result<Box<dyn Decompressor>> {
        let path = path.as_ref();
        self.find_callbacks(compression)?;
        let fd = fs::open_for_reading(path).context(OpenSnafu { path })?;
        let decompressor = self.create_decompressor(compression, fd)?;
        config.apply(&*decompressor);
        Ok(decompressor)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::os::fd::OwnedFd;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use bytes::Bytes;
    use osmio_utils::fs;
    use rand::Rng;
    use snafu::whatever;
    use tempfile::{NamedTempFile, tempdir};
    use tracing_test::traced_test;

    use super::CompressionRegistry;
    use crate::api::{Compressor, Decompressor, INPUT_BUFFER_SIZE};
    use crate::config::{Config, FileCompression, Fsync};
    use crate::dummy::DummyDecompressor;
    use crate::error::{CompressionErrorEnum, Result};
    use crate::none::{NoCompressor, NoDecompressor};

    fn unsupported_compressor(_: OwnedFd, _: Fsync) -> Result<Box<dyn Compressor>> {
        whatever!("compressor should not be built")
    }

    fn dummy_fd(_: OwnedFd) -> Result<Box<dyn Decompressor>> {
        Ok(Box::new(DummyDecompressor::new()))
    }

    fn dummy_buffer(_: Bytes) -> Result<Box<dyn Decompressor>> {
        Ok(Box::new(DummyDecompressor::new()))
    }

    #[test]
    fn test_none_is_always_registered() {
        let registry = CompressionRegistry::new();
        assert!(registry.is_registered(FileCompression::None));
        assert!(!registry.is_registered(FileCompression::Gzip));
        assert_eq!(registry.compressions(), vec![FileCompression::None]);
        assert!(format!("{:?}", registry).contains("None"));
    }

    #[traced_test]
    #[test]
    fn test_first_registration_wins() {
        let mut registry = CompressionRegistry::new();
        assert!(registry.register(
            FileCompression::Gzip,
            unsupported_compressor,
            dummy_fd,
            dummy_buffer,
        ));
        assert!(!registry.register(
            FileCompression::Gzip,
            |fd, fsync| Ok(Box::new(NoCompressor::new(fd, fsync)) as Box<dyn Compressor>),
            |fd| Ok(Box::new(NoDecompressor::from_fd(fd)) as Box<dyn Decompressor>),
            |buffer| Ok(Box::new(NoDecompressor::from_buffer(buffer)) as Box<dyn Decompressor>),
        ));
        assert!(logs_contain("compression already registered"));

        // Still the placeholder from the first registration.
        let decompressor = registry
            .create_decompressor_from_buffer(FileCompression::Gzip, &b"abc"[..])
            .unwrap();
        assert!(!decompressor.is_real());

        // Re-registering the built-in is rejected as well.
        assert!(!registry.register(
            FileCompression::None,
            unsupported_compressor,
            dummy_fd,
            dummy_buffer,
        ));
        let mut decompressor = registry
            .create_decompressor_from_buffer(FileCompression::None, &b"abc"[..])
            .unwrap();
        assert!(decompressor.is_real());
        assert_eq!(decompressor.read().unwrap(), &b"abc"[..]);
    }

    #[test]
    fn test_unregistered_compression_is_reported() {
        let registry = CompressionRegistry::new();
        let file = NamedTempFile::new().unwrap();

        let fd = fs::open_for_writing(file.path(), true).unwrap();
        let err = registry
            .create_compressor(FileCompression::Bzip2, fd, Fsync::No)
            .unwrap_err();
        assert!(err.is_unsupported_compression());
        assert!(err.to_string().contains("'bzip2'"));

        let fd = fs::open_for_reading(file.path()).unwrap();
        let err = registry
            .create_decompressor(FileCompression::Zstd, fd)
            .unwrap_err();
        assert_matches!(
            err.inner(),
            CompressionErrorEnum::UnsupportedCompression {
                compression: FileCompression::Zstd
            }
        );
        assert!(err.to_string().contains("'zstd'"));

        let err = registry
            .create_decompressor_from_buffer(FileCompression::Lz4, Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("'lz4'"));
    }

    #[test]
    fn test_create_compressor() {
        let registry = CompressionRegistry::new();
        let file = NamedTempFile::new().unwrap();
        let fd = fs::open_for_writing(file.path(), true).unwrap();

        let mut compressor = registry
            .create_compressor(FileCompression::None, fd, Fsync::Yes)
            .unwrap();
        compressor.write(b"hello").unwrap();
        compressor.write(b" world").unwrap();
        compressor.close().unwrap();
        compressor.close().unwrap();

        assert_eq!(compressor.file_size(), 11);
        assert_eq!(std::fs::read(file.path()).unwrap(), b"hello world");
    }

    #[test]
    fn test_create_decompressor_knows_file_size() {
        let len = INPUT_BUFFER_SIZE + 17;
        let mut data = vec![0u8; len];
        rand::thread_rng().fill(data.as_mut_slice());
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let registry = CompressionRegistry::new();
        let fd = fs::open_for_reading(file.path()).unwrap();
        let mut decompressor = registry
            .create_decompressor(FileCompression::None, fd)
            .unwrap();
        assert_eq!(decompressor.file_size(), len as u64);
        assert_eq!(decompressor.offset(), 0);

        let mut out = Vec::new();
        loop {
            let chunk = decompressor.read().unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= INPUT_BUFFER_SIZE);
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, data);
        assert_eq!(decompressor.offset(), decompressor.file_size());
        decompressor.close().unwrap();
    }

    #[test]
    fn test_create_decompressor_from_buffer_sets_size() {
        let registry = CompressionRegistry::new();
        let mut decompressor = registry
            .create_decompressor_from_buffer(FileCompression::None, b"<osm/>".to_vec())
            .unwrap();
        assert_eq!(decompressor.file_size(), 6);
        assert_eq!(decompressor.read().unwrap().len(), 6);
        assert!(decompressor.read().unwrap().is_empty());
        assert_eq!(decompressor.offset(), 6);
    }

    #[test]
    fn test_constructor_errors_propagate() {
        let mut registry = CompressionRegistry::new();
        registry.register(
            FileCompression::Gzip,
            unsupported_compressor,
            dummy_fd,
            dummy_buffer,
        );
        let file = NamedTempFile::new().unwrap();
        let fd = fs::open_for_writing(file.path(), true).unwrap();
        let err = registry
            .create_compressor(FileCompression::Gzip, fd, Fsync::No)
            .unwrap_err();
        assert_matches!(err.inner(), CompressionErrorEnum::GenericError { .. });
    }

    #[test]
    fn test_plugin_constructors_are_called() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = CompressionRegistry::new();
        registry.register(
            FileCompression::Lz4,
            unsupported_compressor,
            move |fd| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(NoDecompressor::from_fd(fd)) as Box<dyn Decompressor>)
            },
            dummy_buffer,
        );
        assert_eq!(
            registry.compressions(),
            vec![FileCompression::None, FileCompression::Lz4]
        );

        let file = NamedTempFile::new().unwrap();
        for _ in 0..3 {
            let fd = fs::open_for_reading(file.path()).unwrap();
            let mut decompressor = registry.create_decompressor(FileCompression::Lz4, fd).unwrap();
            assert!(decompressor.read().unwrap().is_empty());
        }
        assert_eq!(built.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_open_compressor_and_decompressor() {
        let registry = CompressionRegistry::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("planet.osm");
        let config = Config {
            fsync: Fsync::Yes,
            remove_buffered_pages: true,
        };

        let mut compressor = registry
            .open_compressor(FileCompression::None, &path, false, &config)
            .unwrap();
        compressor.write(b"<osm/>").unwrap();
        compressor.close().unwrap();

        // Refuses to clobber without overwrite.
        let err = registry
            .open_compressor(FileCompression::None, &path, false, &config)
            .unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(err.errno(), Some(nix::errno::Errno::EEXIST));

        let mut decompressor = registry
            .open_decompressor(FileCompression::None, &path, &config)
            .unwrap();
        assert!(decompressor.want_buffered_pages_removed());
        assert_eq!(decompressor.file_size(), 6);
        assert_eq!(decompressor.read().unwrap(), &b"<osm/>"[..]);
        decompressor.close().unwrap();

        let err = registry
            .open_decompressor(FileCompression::None, dir.path().join("missing.osm"), &config)
            .unwrap_err();
        assert_matches!(err.inner(), CompressionErrorEnum::Open { .. });
    }

    #[test]
    fn test_open_unsupported_creates_nothing() {
        let registry = CompressionRegistry::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("planet.osm.gz");
        let err = registry
            .open_compressor(FileCompression::Gzip, &path, true, &Config::default())
            .unwrap_err();
        assert!(err.is_unsupported_compression());
        assert!(!path.exists());
    }

    #[test]
    fn test_registry_is_shared_across_threads() {
        let registry = Arc::new(CompressionRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let payload = vec![i as u8; 128];
                    let mut decompressor = registry
                        .create_decompressor_from_buffer(FileCompression::None, payload.clone())
                        .unwrap();
                    assert_eq!(decompressor.read().unwrap(), payload);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

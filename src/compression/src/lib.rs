//! Pluggable compression layer for OSM file I/O.
//!
//! A [`CompressionRegistry`] maps each [`FileCompression`] to the
//! constructors of a codec. Readers and writers ask it for a [`Decompressor`]
//! or [`Compressor`] bound to a file descriptor (or, for decompression, to an
//! in-memory buffer) and never see the concrete codec type.

pub mod api;
pub mod config;
pub mod dummy;
pub mod error;
pub mod none;
pub mod registry;

pub use api::{Compressor, Decompressor, INPUT_BUFFER_SIZE, ReadProgress};
pub use config::{Config, FileCompression, Fsync};
pub use dummy::DummyDecompressor;
pub use error::{CompressionError, CompressionErrorEnum, Result};
pub use none::{NoCompressor, NoDecompressor, register_no_compression};
pub use registry::CompressionRegistry;

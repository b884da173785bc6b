use std::fmt::{Display, Formatter};
use std::str::FromStr;

use osmio_utils::env_var::env_var_is_true_or;

use crate::api::Decompressor;

/// Environment switch for [`Config::fsync`].
pub const FSYNC_ENV: &str = "OSMIO_FSYNC";
/// Environment switch for [`Config::remove_buffered_pages`].
pub const REMOVE_BUFFERED_PAGES_ENV: &str = "OSMIO_REMOVE_BUFFERED_PAGES";

/// Compression scheme of an OSM file.
///
/// Only [`FileCompression::None`] is always available. The others resolve
/// only when a codec registered itself for them.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileCompression {
    None,
    Gzip,
    Bzip2,
    Lz4,
    Zstd,
}

impl FileCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCompression::None => "none",
            FileCompression::Gzip => "gzip",
            FileCompression::Bzip2 => "bzip2",
            FileCompression::Lz4 => "lz4",
            FileCompression::Zstd => "zstd",
        }
    }
}

impl Display for FileCompression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCompression {
    type Err = String;

    /// Accepts the canonical names and the usual file suffixes (`gz`, `bz2`, `zst`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FileCompression::None),
            "gzip" | "gz" => Ok(FileCompression::Gzip),
            "bzip2" | "bz2" => Ok(FileCompression::Bzip2),
            "lz4" => Ok(FileCompression::Lz4),
            "zstd" | "zst" => Ok(FileCompression::Zstd),
            _ => Err(format!("unknown compression `{}`", s)),
        }
    }
}

/// Whether a compressor forces its sink to stable storage on close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fsync {
    #[default]
    No,
    Yes,
}

impl Fsync {
    pub fn is_yes(&self) -> bool {
        *self == Fsync::Yes
    }
}

impl From<bool> for Fsync {
    fn from(value: bool) -> Self {
        if value { Fsync::Yes } else { Fsync::No }
    }
}

impl Display for Fsync {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Fsync::No => f.write_str("no"),
            Fsync::Yes => f.write_str("yes"),
        }
    }
}

impl FromStr for Fsync {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" => Ok(Fsync::Yes),
            "no" | "false" | "0" => Ok(Fsync::No),
            _ => Err(format!("invalid fsync policy `{}`", s)),
        }
    }
}

/// Session defaults for readers and writers built on the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Fsync policy handed to new compressors.
    pub fsync: Fsync,
    /// Initial page-cache eviction hint of new decompressors.
    pub remove_buffered_pages: bool,
}

impl Config {
    /// Read `OSMIO_FSYNC` and `OSMIO_REMOVE_BUFFERED_PAGES`, falling back to
    /// the defaults when unset.
    pub fn from_env() -> Self {
        let default = Config::default();
        Self {
            fsync: env_var_is_true_or(FSYNC_ENV, default.fsync.is_yes()).into(),
            remove_buffered_pages: env_var_is_true_or(
                REMOVE_BUFFERED_PAGES_ENV,
                default.remove_buffered_pages,
            ),
        }
    }

    /// Apply the session defaults to a freshly created decompressor.
    pub fn apply(&self, decompressor: &dyn Decompressor) {
        if self.remove_buffered_pages {
            decompressor.set_want_buffered_pages_removed(true);
        }
    }
}

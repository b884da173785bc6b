use std::path::PathBuf;

use nix::errno::Errno;
use snafu::{FromString, GenerateImplicitData, Snafu};
use tracing::Span;

use crate::config::FileCompression;

#[derive(Debug)]
pub struct SpanGuard(tracing::Span);

impl SpanGuard {
    pub fn span(&self) -> &Span {
        &self.0
    }
}

impl GenerateImplicitData for SpanGuard {
    fn generate() -> Self {
        SpanGuard(Span::current())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), display("{source}\n{span:?}:{loc}"))]
pub struct CompressionError {
    source: CompressionErrorEnum,
    #[snafu(implicit)]
    loc: snafu::Location,
    #[snafu(implicit)]
    span: SpanGuard,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompressionErrorEnum {
    #[snafu(display("Support for compression '{compression}' not compiled into this binary"))]
    UnsupportedCompression { compression: FileCompression },
    #[snafu(display("{op} failed: {source}"))]
    Io { op: &'static str, source: Errno },
    #[snafu(display("Open {} failed: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(whatever, display("{message}, cause: {source:?}"))]
    GenericError {
        message: String,

        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CompressionError {
    pub fn inner(&self) -> &CompressionErrorEnum {
        &self.source
    }

    /// The span that was current when the error was raised.
    pub fn span(&self) -> &Span {
        self.span.span()
    }

    pub fn is_unsupported_compression(&self) -> bool {
        matches!(
            self.source,
            CompressionErrorEnum::UnsupportedCompression { .. }
        )
    }

    pub fn is_io_error(&self) -> bool {
        matches!(
            self.source,
            CompressionErrorEnum::Io { .. } | CompressionErrorEnum::Open { .. }
        )
    }

    /// The OS error behind a failed descriptor operation.
    pub fn errno(&self) -> Option<Errno> {
        match &self.source {
            CompressionErrorEnum::Io { source, .. } => Some(*source),
            CompressionErrorEnum::Open { source, .. } => source.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }
}

impl<E> From<E> for CompressionError
where
    E: Into<CompressionErrorEnum>,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self {
            source: error.into(),
            loc: GenerateImplicitData::generate(),
            span: GenerateImplicitData::generate(),
        }
    }
}

impl FromString for CompressionError {
    type Source = Box<dyn std::error::Error + Send + Sync>;
    fn without_source(message: String) -> Self {
        CompressionErrorEnum::GenericError {
            message,
            source: None,
        }
        .into()
    }

    fn with_source(source: Self::Source, message: String) -> Self {
        CompressionErrorEnum::GenericError {
            message,
            source: Some(source),
        }
        .into()
    }
}

pub type Result<T> = std::result::Result<T, CompressionError>;

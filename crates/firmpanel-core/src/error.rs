//! Common error type for panel construction pipelines

use std::path::PathBuf;

/// Result alias used across the firmpanel library crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal pipeline error.
///
/// Per-file and per-artifact problems surface here unmodified. Per-field
/// problems never do: they are [`CoercionFailure`](crate::CoercionFailure)s
/// absorbed as nulls by the reader.
#[derive(Debug)]
pub enum Error {
    /// Source file cannot be attributed to a vintage year, or its header
    /// lacks a required column.
    MalformedInput { path: PathBuf, reason: String },
    /// County reference table is absent.
    MissingReferenceData { path: PathBuf },
    /// Reference table holds the same county key more than once and the
    /// configured policy rejects duplicates.
    DuplicateKey { fips: String, count: usize },
    /// Persisted artifact is declared present but cannot be read.
    CacheRead { artifact: String, reason: String },
    /// Another rebuild holds the lock for this artifact.
    ArtifactLocked { path: PathBuf },
    /// Cancellation requested or deadline exceeded.
    Cancelled,
    Io(std::io::Error),
    Arrow(arrow::error::ArrowError),
    Parquet(parquet::errors::ParquetError),
    Csv(csv::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput { path, reason } => {
                write!(f, "malformed input {}: {reason}", path.display())
            }
            Self::MissingReferenceData { path } => {
                write!(f, "missing reference data: {}", path.display())
            }
            Self::DuplicateKey { fips, count } => {
                write!(f, "duplicate county key {fips} ({count} rows)")
            }
            Self::CacheRead { artifact, reason } => {
                write!(f, "cannot read cached {artifact}: {reason}")
            }
            Self::ArtifactLocked { path } => {
                write!(f, "rebuild already in progress: {}", path.display())
            }
            Self::Cancelled => f.write_str("cancelled"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Arrow(e) => write!(f, "Arrow: {e}"),
            Self::Parquet(e) => write!(f, "Parquet: {e}"),
            Self::Csv(e) => write!(f, "CSV: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Arrow(e) => Some(e),
            Self::Parquet(e) => Some(e),
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Parquet(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn cache_read(artifact: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::CacheRead {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from cancellation rather than bad data.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! Firmpanel Core - Common infrastructure for business panel pipelines
//!
//! Error taxonomy, non-strict coercion, role-keyed paths, cancellation,
//! Arrow table conversion and Parquet/CSV sinks shared by the panel,
//! merge and store crates.

pub mod cancel;
pub mod coerce;
pub mod error;
pub mod logging;
pub mod paths;
pub mod progress;
pub mod sink;
pub mod table;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use coerce::{CoercionFailure, CoercionStats, zero_pad_fips};
pub use error::{Error, Result};
pub use logging::{IndicatifLogger, init_logging};
pub use paths::{Paths, Role};
pub use progress::{ProgressContext, SharedProgress, fmt_num, fmt_pct};
pub use sink::{CsvSink, ParquetSink, read_parquet};
pub use table::Columnar;

//! Firmpanel Pipeline - cached panel, survival and merged tables
//!
//! Wires the panel, merge and store crates together behind four entry
//! points that each take a single `rebuild` flag:
//!
//! - [`Pipeline::load_data`]: panel and survival tables
//! - [`Pipeline::load_social_capital`]: county reference table
//! - [`Pipeline::merged_survival`]: survival rows with county measures
//! - [`Pipeline::merged_combined`]: panel rows with county measures
//!
//! Configuration is layered TOML ([`Config::load`]); summary statistics and
//! the column contract of the merged tables live in [`describe`] and
//! [`contract`].

pub mod config;
pub mod contract;
pub mod describe;
pub mod pipeline;

pub use config::{CacheConfig, CancelConfig, Config, PathsConfig, WorkersConfig};
pub use contract::{Contract, Violation};
pub use describe::{SummaryRow, render, summary_stats, write_summary_csv};
pub use pipeline::{MergedCombined, MergedSurvival, Pipeline};

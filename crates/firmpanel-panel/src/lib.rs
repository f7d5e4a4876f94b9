//! Firmpanel Panel - yearly business extracts to a longitudinal panel
//!
//! Parses yearly registry extracts into normalized records, concatenates
//! them into one panel, and derives per-entity survival flags.
//!
//! # Features
//!
//! - Permissive delimited parsing with non-strict field coercion
//! - Parallel per-file reads with rayon, deterministic vintage ordering
//! - Hashed-set survival flags, independent per follow-up year
//!
//! # Example
//!
//! ```ignore
//! use firmpanel_panel::{PanelConfig, SurvivalLayout, build_panel, compute_survival};
//!
//! let config = PanelConfig::default();
//! let panel = build_panel(&dir, &config, 4, &cancel, &progress)?;
//! let layout = SurvivalLayout::new(config.baseline_year, &config.follow_up_years);
//! let survival = compute_survival(&panel.records, &layout);
//! ```

pub mod builder;
pub mod config;
pub mod extract;
pub mod record;
pub mod schema;
pub mod survival;

// Re-exports
pub use builder::{FileSummary, Panel, build_panel, discover_extracts};
pub use config::PanelConfig;
pub use extract::{ReadStats, YearlySet, read_extract, vintage_year};
pub use record::{SurvivalLayout, SurvivalRecord, YearlyRecord};
pub use survival::compute_survival;

//! Firmpanel Merge - county social-capital data and the panel left join
//!
//! Loads the county reference table under an explicit duplicate-key
//! policy and left-joins panel or survival rows onto it, reporting the
//! match rate.

pub mod config;
pub mod merge;
pub mod social_capital;

// Re-exports
pub use config::{DuplicateKeyPolicy, MergeConfig, ReferenceConfig};
pub use merge::{CountyKeyed, MergeReport, MergedTable, left_join};
pub use social_capital::{Measures, SocialCapitalRecord, SocialCapitalTable, load_social_capital};

//! Reference-table and merge configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to do when the reference table holds a county key more than once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// First occurrence in file order wins; the rest are counted and logged
    #[default]
    KeepFirst,
    /// Fail with `DuplicateKey`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// County reference file, relative to the `data_input` role
    pub file: PathBuf,
    pub duplicate_keys: DuplicateKeyPolicy,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("OI_data/social_capital_county.csv"),
            duplicate_keys: DuplicateKeyPolicy::KeepFirst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Match rates below this are reported as low
    pub min_match_rate: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_match_rate: 0.9,
        }
    }
}

//! Panel construction configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime configuration for extract discovery, parsing and survival flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Extract directory, relative to the `data_input` role
    pub extract_dir: PathBuf,
    /// File name glob matched inside `extract_dir`
    pub extract_glob: String,
    /// The vintage year is the four digits right before this marker
    pub year_marker: String,
    /// Field delimiter of the extract files
    pub delimiter: char,
    /// Year survival tracking starts from
    pub baseline_year: i32,
    /// Years checked for presence of each baseline entity
    pub follow_up_years: Vec<i32>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            extract_dir: PathBuf::from("business_data"),
            extract_glob: "*_Business_Academic*.txt".to_string(),
            year_marker: "_Business".to_string(),
            delimiter: ',',
            baseline_year: 2019,
            follow_up_years: vec![2020, 2021, 2022, 2023, 2024],
        }
    }
}

impl PanelConfig {
    /// Delimiter as the single byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }

    /// Last follow-up year, the usual survival outcome.
    pub fn last_follow_up(&self) -> Option<i32> {
        self.follow_up_years.iter().copied().max()
    }
}

//! Persisted artifact identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A persisted pipeline output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactName {
    Panel,
    Survival,
    SurvivalMerged,
    CombinedMerged,
}

impl ArtifactName {
    pub const ALL: [ArtifactName; 4] = [
        Self::Panel,
        Self::Survival,
        Self::SurvivalMerged,
        Self::CombinedMerged,
    ];

    /// Link name under the output directory, also the generation prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Survival => "survival",
            Self::SurvivalMerged => "survival_merged",
            Self::CombinedMerged => "combined_merged",
        }
    }

    /// Files every committed generation of this artifact holds.
    pub fn files(self) -> &'static [&'static str] {
        match self {
            Self::Panel => &["panel.parquet", "panel.csv"],
            Self::Survival => &["survival.parquet"],
            Self::SurvivalMerged => &["survival_merged.parquet"],
            Self::CombinedMerged => &["combined_merged.parquet"],
        }
    }

    /// The Parquet file the pipeline loads back.
    pub fn parquet_file(self) -> &'static str {
        self.files()[0]
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown artifact: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for a in ArtifactName::ALL {
            assert_eq!(a.as_str().parse::<ArtifactName>().unwrap(), a);
        }
        assert!("joined".parse::<ArtifactName>().is_err());
    }

    #[test]
    fn panel_has_csv_export() {
        assert_eq!(ArtifactName::Panel.files(), ["panel.parquet", "panel.csv"]);
        assert_eq!(ArtifactName::Panel.parquet_file(), "panel.parquet");
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&ArtifactName::SurvivalMerged).unwrap();
        assert_eq!(json, "\"survival_merged\"");
    }
}

//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use firmpanel_core::{CancelToken, Paths, Role};
use firmpanel_merge::{MergeConfig, ReferenceConfig};
use firmpanel_panel::PanelConfig;
use serde::{Deserialize, Serialize};

/// Global configuration for firmpanel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub panel: PanelConfig,
    pub reference: ReferenceConfig,
    pub merge: MergeConfig,
    pub cache: CacheConfig,
    pub workers: WorkersConfig,
    pub cancel: CancelConfig,
}

/// Project root plus optional per-role overrides (relative to `root`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub data_input: Option<PathBuf>,
    pub data_output: Option<PathBuf>,
    pub plots: Option<PathBuf>,
    pub tables: Option<PathBuf>,
    pub models: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_input: None,
            data_output: None,
            plots: None,
            tables: None,
            models: None,
        }
    }
}

impl PathsConfig {
    pub fn resolve(&self) -> Paths {
        let overrides = [
            (Role::DataInput, &self.data_input),
            (Role::DataOutput, &self.data_output),
            (Role::Plots, &self.plots),
            (Role::Tables, &self.tables),
            (Role::Models, &self.models),
        ];
        overrides
            .into_iter()
            .fold(Paths::from_root(&self.root), |paths, (role, dir)| match dir {
                Some(dir) => paths.with(role, self.root.join(dir)),
                None => paths,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Rebuild an artifact whose recorded input fingerprint no longer matches
    pub check_staleness: bool,
    pub zstd_level: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            check_staleness: false,
            zstd_level: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 16,
        }
    }
}

impl WorkersConfig {
    /// Requested worker count, else the default, clamped to `1..=max`.
    pub fn effective(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).clamp(1, self.max.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelConfig {
    /// Abort a run that takes longer than this
    pub deadline_secs: Option<u64>,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./firmpanel.toml (current directory)
    /// 2. ~/.config/firmpanel/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("firmpanel.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "firmpanel") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn paths(&self) -> Paths {
        self.paths.resolve()
    }

    /// Fresh token carrying the configured deadline, if any.
    pub fn cancel_token(&self) -> CancelToken {
        match self.cancel.deadline_secs {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }
}

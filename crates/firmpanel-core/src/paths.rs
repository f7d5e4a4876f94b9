//! Directory resolution keyed by logical role
//!
//! Built once at program start and passed by reference to every component.
//! Nothing below the entry points constructs a path on its own.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Logical directory role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DataInput,
    DataOutput,
    Plots,
    Tables,
    Models,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::DataInput,
        Role::DataOutput,
        Role::Plots,
        Role::Tables,
        Role::Models,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::DataInput => "data_input",
            Self::DataOutput => "data_output",
            Self::Plots => "plots",
            Self::Tables => "tables",
            Self::Models => "models",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Resolved directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    data_input: PathBuf,
    data_output: PathBuf,
    plots: PathBuf,
    tables: PathBuf,
    models: PathBuf,
}

impl Paths {
    /// Conventional layout under a project root:
    ///
    /// ```text
    /// {root}/Data/             data_input
    /// {root}/Output/Data/      data_output
    /// {root}/Output/Plots/     plots
    /// {root}/Output/Tables/    tables
    /// {root}/Output/Models/    models
    /// ```
    pub fn from_root(root: &Path) -> Self {
        let output = root.join("Output");
        Self {
            data_input: root.join("Data"),
            data_output: output.join("Data"),
            plots: output.join("Plots"),
            tables: output.join("Tables"),
            models: output.join("Models"),
        }
    }

    /// Replace the directory for one role.
    pub fn with(mut self, role: Role, dir: impl Into<PathBuf>) -> Self {
        *self.slot(role) = dir.into();
        self
    }

    pub fn get(&self, role: Role) -> &Path {
        match role {
            Role::DataInput => &self.data_input,
            Role::DataOutput => &self.data_output,
            Role::Plots => &self.plots,
            Role::Tables => &self.tables,
            Role::Models => &self.models,
        }
    }

    /// Path of `rel` under the directory for `role`.
    pub fn resolve(&self, role: Role, rel: impl AsRef<Path>) -> PathBuf {
        self.get(role).join(rel)
    }

    /// Create every output directory (input is never created).
    pub fn ensure_output_dirs(&self) -> std::io::Result<()> {
        for role in Role::ALL {
            if role != Role::DataInput {
                std::fs::create_dir_all(self.get(role))?;
            }
        }
        Ok(())
    }

    fn slot(&mut self, role: Role) -> &mut PathBuf {
        match role {
            Role::DataInput => &mut self.data_input,
            Role::DataOutput => &mut self.data_output,
            Role::Plots => &mut self.plots,
            Role::Tables => &mut self.tables,
            Role::Models => &mut self.models,
        }
    }
}

//! Panel builder: discover extracts, read them in parallel, concatenate

use std::path::{Path, PathBuf};
use std::time::Instant;

use firmpanel_core::{CancelToken, Error, ProgressContext, Result, fmt_num};
use rayon::prelude::*;

use crate::config::PanelConfig;
use crate::extract::{self, ReadStats, YearlySet};
use crate::record::YearlyRecord;

/// One file's contribution to the panel
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub path: PathBuf,
    pub year: i32,
    pub stats: ReadStats,
}

/// Longitudinal panel plus per-file read statistics
#[derive(Debug, Clone, Default)]
pub struct Panel {
    /// Ordered by `file_year`, then source path, then row order within a file
    pub records: Vec<YearlyRecord>,
    pub files: Vec<FileSummary>,
    pub stats: ReadStats,
}

impl Panel {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct vintages present, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.files.iter().map(|f| f.year).collect();
        years.dedup();
        years
    }
}

/// Extract files under `dir` matching the configured glob, sorted by path.
///
/// A missing directory yields no files.
pub fn discover_extracts(dir: &Path, config: &PanelConfig) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(&config.extract_glob);
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::malformed(dir, format!("bad extract glob: {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every extract under `dir` and concatenate them in vintage order.
///
/// Any file-level failure fails the whole build; nothing is persisted here.
pub fn build_panel(
    dir: &Path,
    config: &PanelConfig,
    workers: usize,
    cancel: &CancelToken,
    progress: &ProgressContext,
) -> Result<Panel> {
    let start = Instant::now();
    let files = discover_extracts(dir, config)?;

    if files.is_empty() {
        log::warn!(
            "No extract files matching {:?} in {}; panel is empty",
            config.extract_glob,
            dir.display()
        );
        return Ok(Panel::default());
    }

    // Attribute every file before reading any of them
    for path in &files {
        extract::vintage_year(path, &config.year_marker)?;
    }

    log::info!(
        "Reading {} extract files with {} workers",
        files.len(),
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let mut sets: Vec<YearlySet> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                cancel.check()?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let pb = progress.file_bar(&name, 0);
                extract::read_extract(path, config, cancel, &pb)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    sets.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.path.cmp(&b.path)));

    let mut panel = Panel {
        records: Vec::with_capacity(sets.iter().map(|s| s.records.len()).sum()),
        ..Default::default()
    };
    for set in sets {
        panel.stats.merge(&set.stats);
        panel.files.push(FileSummary {
            path: set.path,
            year: set.year,
            stats: set.stats,
        });
        panel.records.extend(set.records);
    }

    log::info!(
        "Panel: {} rows from {} files, years {:?} ({:.1}s)",
        fmt_num(panel.records.len()),
        panel.files.len(),
        panel.years(),
        start.elapsed().as_secs_f64()
    );
    if panel.is_empty() {
        log::warn!("Panel is empty: no rows survived parsing");
    }

    Ok(panel)
}

//! Cached entry points: panel, survival and the two merged tables
//!
//! Each entry point takes a single `rebuild` flag. Without it an artifact
//! that is already materialized is loaded as is; with it the whole
//! upstream chain is recomputed and every artifact on the way replaced.
//!
//! ```text
//! extracts ──► panel ──► survival ──► survival_merged
//!                │                        ▲
//!                └────► combined_merged ◄─┴── social capital
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::RecordBatch;
use firmpanel_core::{
    CancelToken, Columnar, CsvSink, Error, ParquetSink, Paths, ProgressContext, Result, Role,
    SharedProgress, fmt_num, fmt_pct, read_parquet,
};
use firmpanel_merge::{
    DuplicateKeyPolicy, MergeReport, MergedTable, SocialCapitalTable, left_join,
    load_social_capital,
};
use firmpanel_panel::{
    PanelConfig, SurvivalLayout, SurvivalRecord, YearlyRecord, build_panel, compute_survival,
    discover_extracts,
};
use firmpanel_store::{ArtifactName, Fingerprint, Generation, Lookup, Store};
use serde::Serialize;

use crate::config::Config;
use crate::contract::Contract;

/// Survival rows joined with county measures.
pub type MergedSurvival = MergedTable<SurvivalRecord>;
/// Panel rows joined with county measures.
pub type MergedCombined = MergedTable<YearlyRecord>;

/// Rows per batch handed to a sink; cancellation is checked between them.
const WRITE_CHUNK: usize = 64 * 1024;

/// One resolved artifact: its rows, the generation holding them, and
/// whether this call built it.
struct Stage<T> {
    data: T,
    generation: Generation,
    built: bool,
}

enum Plan {
    Reuse(Generation),
    Build { fingerprint: String },
}

/// Content-affecting inputs of each artifact, recorded in its manifest.
#[derive(Serialize)]
struct PanelInput<'a> {
    panel: &'a PanelConfig,
}

#[derive(Serialize)]
struct SurvivalInput<'a> {
    panel_hash: &'a str,
    baseline_year: i32,
    follow_up_years: &'a [i32],
}

#[derive(Serialize)]
struct MergeInput<'a> {
    upstream_hash: &'a str,
    reference_file: &'a Path,
    duplicate_keys: DuplicateKeyPolicy,
}

/// Panel pipeline bound to one configuration and output root.
pub struct Pipeline {
    config: Config,
    paths: Paths,
    workers: usize,
    cancel: CancelToken,
    progress: SharedProgress,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let paths = config.paths();
        let workers = config.workers.effective(None);
        let cancel = config.cancel_token();
        Self {
            config,
            paths,
            workers,
            cancel,
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the configured worker count (still clamped to `workers.max`).
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = self.config.workers.effective(workers);
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Open the artifact store, creating the output directories if needed.
    pub fn store(&self) -> Result<Store> {
        self.paths.ensure_output_dirs()?;
        Store::new(self.paths.get(Role::DataOutput))
    }

    pub fn survival_layout(&self) -> SurvivalLayout {
        SurvivalLayout::new(
            self.config.panel.baseline_year,
            &self.config.panel.follow_up_years,
        )
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.paths
            .resolve(Role::DataInput, &self.config.panel.extract_dir)
    }

    pub fn reference_path(&self) -> PathBuf {
        self.paths
            .resolve(Role::DataInput, &self.config.reference.file)
    }

    // ----------------------------------------------------------------
    // Entry points
    // ----------------------------------------------------------------

    /// Panel and survival tables.
    pub fn load_data(&self, rebuild: bool) -> Result<(Vec<YearlyRecord>, Vec<SurvivalRecord>)> {
        let store = self.store()?;
        let panel = self.panel_stage(&store, rebuild)?;
        let survival = self.survival_from(&store, &panel, rebuild)?;
        Ok((panel.data, survival.data))
    }

    /// County reference table. Never cached: it is small and read fresh.
    pub fn load_social_capital(&self) -> Result<SocialCapitalTable> {
        load_social_capital(&self.reference_path(), self.config.reference.duplicate_keys)
    }

    /// Survival table left-joined with county measures, with the report
    /// of the join.
    pub fn merged_survival(&self, rebuild: bool) -> Result<(MergedSurvival, MergeReport)> {
        let store = self.store()?;
        let artifact = ArtifactName::SurvivalMerged;
        let layout = self.survival_layout();
        let min = self.config.merge.min_match_rate;
        if let Some(generation) = self.reusable(&store, artifact, rebuild)? {
            return self.load_merged(&generation, |b| MergedSurvival::decode_all(&layout, b));
        }

        let survival = self.survival_stage(&store, rebuild)?;
        let fingerprint = self.merge_fingerprint(&survival.generation)?;
        let rebuild = rebuild || survival.built;
        match self.plan(&store, artifact, rebuild, || Ok(fingerprint.clone()))? {
            Plan::Reuse(generation) => {
                self.load_merged(&generation, |b| MergedSurvival::decode_all(&layout, b))
            }
            Plan::Build { fingerprint } => {
                let upstream = &survival.generation.manifest.content_hash;
                let stage = self.materialize(
                    &store,
                    artifact,
                    &fingerprint,
                    &self.merge_input_json(upstream)?,
                    || {
                        let reference = self.load_social_capital()?;
                        Ok(left_join(survival.data, &reference, min))
                    },
                    |(merged, _): &(MergedSurvival, MergeReport)| {
                        let batch = merged.to_batch(&layout)?;
                        check_contract(&Contract::merged_survival(&layout), &batch);
                        Ok(batch)
                    },
                )?;
                Ok(stage.data)
            }
        }
    }

    /// Full panel left-joined with county measures, with the report of the
    /// join.
    pub fn merged_combined(&self, rebuild: bool) -> Result<(MergedCombined, MergeReport)> {
        let store = self.store()?;
        let artifact = ArtifactName::CombinedMerged;
        let min = self.config.merge.min_match_rate;
        if let Some(generation) = self.reusable(&store, artifact, rebuild)? {
            return self.load_merged(&generation, |b| MergedCombined::decode_all(&(), b));
        }

        let panel = self.panel_stage(&store, rebuild)?;
        let fingerprint = self.merge_fingerprint(&panel.generation)?;
        let rebuild = rebuild || panel.built;
        match self.plan(&store, artifact, rebuild, || Ok(fingerprint.clone()))? {
            Plan::Reuse(generation) => {
                self.load_merged(&generation, |b| MergedCombined::decode_all(&(), b))
            }
            Plan::Build { fingerprint } => {
                let upstream = &panel.generation.manifest.content_hash;
                let stage = self.materialize(
                    &store,
                    artifact,
                    &fingerprint,
                    &self.merge_input_json(upstream)?,
                    || {
                        let reference = self.load_social_capital()?;
                        Ok(left_join(panel.data, &reference, min))
                    },
                    |(merged, _): &(MergedCombined, MergeReport)| {
                        let batch = merged.to_batch(&())?;
                        check_contract(&Contract::merged_combined(), &batch);
                        Ok(batch)
                    },
                )?;
                Ok(stage.data)
            }
        }
    }

    // ----------------------------------------------------------------
    // Stages
    // ----------------------------------------------------------------

    fn panel_stage(&self, store: &Store, rebuild: bool) -> Result<Stage<Vec<YearlyRecord>>> {
        let artifact = ArtifactName::Panel;
        let input_json = to_json(&PanelInput {
            panel: &self.config.panel,
        })?;
        match self.plan(store, artifact, rebuild, || self.panel_fingerprint(&input_json))? {
            Plan::Reuse(generation) => {
                let data = self.load(&generation, |b| YearlyRecord::decode_all(&(), b))?;
                Ok(Stage {
                    data,
                    generation,
                    built: false,
                })
            }
            Plan::Build { fingerprint } => self.materialize(
                store,
                artifact,
                &fingerprint,
                &input_json,
                || {
                    let panel = build_panel(
                        &self.extract_dir(),
                        &self.config.panel,
                        self.workers,
                        &self.cancel,
                        &self.progress,
                    )?;
                    Ok(panel.records)
                },
                |records: &Vec<YearlyRecord>| YearlyRecord::to_batch(&(), records),
            ),
        }
    }

    /// Survival stage, loading the panel only when survival itself has to
    /// be checked or rebuilt.
    fn survival_stage(&self, store: &Store, rebuild: bool) -> Result<Stage<Vec<SurvivalRecord>>> {
        let artifact = ArtifactName::Survival;
        if let Some(generation) = self.reusable(store, artifact, rebuild)? {
            let layout = self.survival_layout();
            let data = self.load(&generation, |b| SurvivalRecord::decode_all(&layout, b))?;
            return Ok(Stage {
                data,
                generation,
                built: false,
            });
        }
        let panel = self.panel_stage(store, rebuild)?;
        self.survival_from(store, &panel, rebuild)
    }

    fn survival_from(
        &self,
        store: &Store,
        panel: &Stage<Vec<YearlyRecord>>,
        rebuild: bool,
    ) -> Result<Stage<Vec<SurvivalRecord>>> {
        let artifact = ArtifactName::Survival;
        let layout = self.survival_layout();
        let input_json = to_json(&SurvivalInput {
            panel_hash: &panel.generation.manifest.content_hash,
            baseline_year: layout.baseline_year,
            follow_up_years: &layout.follow_up_years,
        })?;
        let fingerprint = Fingerprint::new().text("input", &input_json).finish();
        let rebuild = rebuild || panel.built;

        match self.plan(store, artifact, rebuild, || Ok(fingerprint.clone()))? {
            Plan::Reuse(generation) => {
                let data = self.load(&generation, |b| SurvivalRecord::decode_all(&layout, b))?;
                Ok(Stage {
                    data,
                    generation,
                    built: false,
                })
            }
            Plan::Build { fingerprint } => self.materialize(
                store,
                artifact,
                &fingerprint,
                &input_json,
                || Ok(compute_survival(&panel.data, &layout)),
                |rows: &Vec<SurvivalRecord>| SurvivalRecord::to_batch(&layout, rows),
            ),
        }
    }

    // ----------------------------------------------------------------
    // Cache decisions
    // ----------------------------------------------------------------

    /// Present generation usable without looking at any input.
    fn reusable(
        &self,
        store: &Store,
        artifact: ArtifactName,
        rebuild: bool,
    ) -> Result<Option<Generation>> {
        if rebuild || self.config.cache.check_staleness {
            return Ok(None);
        }
        match store.lookup(artifact)? {
            Lookup::Present(generation) => {
                log::info!("{artifact}: using cached {}", generation.name());
                Ok(Some(generation))
            }
            Lookup::Absent => Ok(None),
        }
    }

    /// Decide between loading the current generation and building a new
    /// one. `fingerprint` is only evaluated when it is needed.
    fn plan(
        &self,
        store: &Store,
        artifact: ArtifactName,
        rebuild: bool,
        fingerprint: impl FnOnce() -> Result<String>,
    ) -> Result<Plan> {
        if rebuild {
            log::info!("{artifact}: rebuilding");
            return Ok(Plan::Build {
                fingerprint: fingerprint()?,
            });
        }
        let generation = match store.lookup(artifact)? {
            Lookup::Present(generation) => generation,
            Lookup::Absent => {
                log::info!("{artifact}: not materialized, building");
                return Ok(Plan::Build {
                    fingerprint: fingerprint()?,
                });
            }
        };
        if !self.config.cache.check_staleness {
            log::info!("{artifact}: using cached {}", generation.name());
            return Ok(Plan::Reuse(generation));
        }

        let fingerprint = fingerprint()?;
        if generation.manifest.input_fingerprint == fingerprint {
            log::info!("{artifact}: {} is current", generation.name());
            Ok(Plan::Reuse(generation))
        } else {
            log::info!("{artifact}: inputs changed since {}, rebuilding", generation.name());
            Ok(Plan::Build { fingerprint })
        }
    }

    /// Extract files by name and content, plus the panel configuration.
    fn panel_fingerprint(&self, input_json: &str) -> Result<String> {
        let files = discover_extracts(&self.extract_dir(), &self.config.panel)?;
        let mut fingerprint = Fingerprint::new().text("input", input_json);
        for path in &files {
            fingerprint = fingerprint.file(path)?;
        }
        Ok(fingerprint.finish())
    }

    /// Upstream content plus the reference table.
    fn merge_fingerprint(&self, upstream: &Generation) -> Result<String> {
        let reference = self.reference_path();
        let fingerprint = Fingerprint::new()
            .text("input", &self.merge_input_json(&upstream.manifest.content_hash)?)
            .file(&reference)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::MissingReferenceData { path: reference },
                _ => Error::Io(e),
            })?;
        Ok(fingerprint.finish())
    }

    fn merge_input_json(&self, upstream_hash: &str) -> Result<String> {
        to_json(&MergeInput {
            upstream_hash,
            reference_file: &self.config.reference.file,
            duplicate_keys: self.config.reference.duplicate_keys,
        })
    }

    // ----------------------------------------------------------------
    // Load / build
    // ----------------------------------------------------------------

    /// Read a committed generation. Any failure is `CacheRead`, never a
    /// reason to rebuild.
    fn load<T, F>(&self, generation: &Generation, decode: F) -> Result<T>
    where
        F: FnOnce(&[RecordBatch]) -> Result<T>,
    {
        let artifact = generation.manifest.artifact;
        let start = Instant::now();
        let (_, batches) = read_parquet(&generation.parquet())
            .map_err(|e| Error::cache_read(artifact.as_str(), e))?;

        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        if rows != generation.manifest.row_count {
            return Err(Error::cache_read(
                artifact.as_str(),
                format!(
                    "{} rows on disk, manifest records {}",
                    rows, generation.manifest.row_count
                ),
            ));
        }
        let data =
            decode(batches.as_slice()).map_err(|e| Error::cache_read(artifact.as_str(), e))?;

        log::info!(
            "{artifact}: loaded {} rows ({:.1}s)",
            fmt_num(rows),
            start.elapsed().as_secs_f64()
        );
        Ok(data)
    }

    /// Load a merged table and recount its match report.
    fn load_merged<T, F>(
        &self,
        generation: &Generation,
        decode: F,
    ) -> Result<(MergedTable<T>, MergeReport)>
    where
        F: FnOnce(&[RecordBatch]) -> Result<MergedTable<T>>,
    {
        let merged = self.load(generation, decode)?;
        let report = merged.report(self.config.merge.min_match_rate);
        log::info!(
            "{}: match rate {}",
            generation.manifest.artifact,
            fmt_pct(report.match_rate)
        );
        Ok((merged, report))
    }

    /// Build an artifact under its rebuild lock and commit a new generation.
    ///
    /// A failure or cancellation anywhere before the commit discards the
    /// staging directory and leaves the current generation in place.
    fn materialize<T>(
        &self,
        store: &Store,
        artifact: ArtifactName,
        fingerprint: &str,
        config_json: &str,
        build: impl FnOnce() -> Result<T>,
        to_batch: impl FnOnce(&T) -> Result<RecordBatch>,
    ) -> Result<Stage<T>> {
        let _lock = store.lock(artifact)?;
        let line = self.progress.stage_line(artifact.as_str());
        line.set_message("building");
        let start = Instant::now();

        let data = build()?;
        self.cancel.check()?;

        line.set_message("writing");
        let batch = to_batch(&data)?;
        let staging = store.begin(artifact)?;
        let rows = self.write_parquet(staging.dir(), artifact.parquet_file(), &batch)?;
        if artifact == ArtifactName::Panel {
            self.write_csv(staging.dir(), "panel.csv", &batch)?;
        }

        self.cancel.check()?;
        let generation = store.commit(staging, fingerprint, config_json, rows)?;
        line.finish_and_clear();

        log::info!(
            "{artifact}: built {} rows ({:.1}s)",
            fmt_num(rows),
            start.elapsed().as_secs_f64()
        );
        Ok(Stage {
            data,
            generation,
            built: true,
        })
    }

    fn write_parquet(&self, dir: &Path, filename: &str, batch: &RecordBatch) -> Result<usize> {
        let mut sink = ParquetSink::new(
            dir,
            filename,
            &batch.schema(),
            self.config.cache.zstd_level,
        )?;
        for chunk in chunks(batch) {
            self.cancel.check()?;
            sink.write_batch(&chunk)?;
        }
        sink.finalize()
    }

    fn write_csv(&self, dir: &Path, filename: &str, batch: &RecordBatch) -> Result<usize> {
        let mut sink = CsvSink::new(dir, filename)?;
        if batch.num_rows() == 0 {
            // Header only
            sink.write_batch(batch)?;
        }
        for chunk in chunks(batch) {
            self.cancel.check()?;
            sink.write_batch(&chunk)?;
        }
        sink.finalize()
    }
}

fn chunks(batch: &RecordBatch) -> impl Iterator<Item = RecordBatch> + '_ {
    (0..batch.num_rows())
        .step_by(WRITE_CHUNK)
        .map(move |offset| batch.slice(offset, WRITE_CHUNK.min(batch.num_rows() - offset)))
}

fn to_json(value: &impl Serialize) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Io(std::io::Error::other(e)))
}

/// Contract violations are logged, not fatal: the artifact is still usable
/// by analyses that do not need the offending column.
fn check_contract(contract: &Contract, batch: &RecordBatch) {
    let violations = contract.check_batches(&batch.schema(), std::slice::from_ref(batch));
    for violation in &violations {
        log::warn!("{}: {violation}", contract.table);
    }
}

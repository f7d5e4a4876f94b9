//! firmpanel - business survival panel pipeline
//!
//! Builds a longitudinal panel from yearly business extracts, derives
//! survival flags, merges county social-capital measures and caches every
//! artifact as Parquet.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use firmpanel_core::Role;
use firmpanel_pipeline::{Config, Pipeline};

mod cmd;

#[derive(Parser)]
#[command(name = "firmpanel")]
#[command(about = "Business survival panel pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./firmpanel.toml or ~/.config/firmpanel/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Number of parallel extract readers
    #[arg(short, long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Build (or load) the panel and survival tables
    Build(cmd::build::BuildArgs),
    /// Merge county social-capital measures onto survival and panel rows
    Merge(cmd::merge::MergeArgs),
    /// Summary statistics of the merged tables
    Describe(cmd::describe::DescribeArgs),
    /// Validate cached merged tables against the analysis column contract
    Check,
    /// Show the current generation of every artifact
    Status,
    /// Re-hash artifact files against their manifests
    Verify {
        /// Generation directory to verify (default: all)
        generation: Option<String>,
    },
    /// Remove unreferenced generations and stale staging directories
    Gc {
        /// Actually delete (otherwise dry-run)
        #[arg(long)]
        confirm: bool,
    },
    /// Show resolved paths and settings
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(firmpanel_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    firmpanel_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    let cancel = config.cancel_token();
    cancel
        .install_signal_handlers()
        .context("failed to install signal handlers")?;

    let pipeline = Pipeline::new(config)
        .with_progress(Arc::clone(&progress))
        .with_cancel(cancel)
        .with_workers(cli.workers);

    match cli.command {
        Command::Build(args) => cmd::build::run(args, &pipeline),
        Command::Merge(args) => cmd::merge::run(args, &pipeline),
        Command::Describe(args) => cmd::describe::run(args, &pipeline),
        Command::Check => cmd::check::run(&pipeline),
        Command::Status => cmd::store::status(&pipeline.store()?),
        Command::Verify { generation } => {
            cmd::store::verify(&pipeline.store()?, generation.as_deref())
        }
        Command::Gc { confirm } => cmd::store::gc(&pipeline.store()?, confirm),
        Command::Config => {
            show_config(&pipeline);
            Ok(())
        }
    }
}

fn show_config(pipeline: &Pipeline) {
    let config = pipeline.config();
    let mut table = cmd::table(&["Setting", "Value"]);

    for role in Role::ALL {
        table.add_row(vec![
            role.key().to_string(),
            pipeline.paths().get(role).display().to_string(),
        ]);
    }
    table.add_row(vec![
        "Extracts".to_string(),
        format!(
            "{} ({})",
            pipeline.extract_dir().display(),
            config.panel.extract_glob
        ),
    ]);
    table.add_row(vec![
        "Reference".to_string(),
        pipeline.reference_path().display().to_string(),
    ]);
    table.add_row(vec![
        "Baseline year".to_string(),
        config.panel.baseline_year.to_string(),
    ]);
    table.add_row(vec![
        "Follow-up years".to_string(),
        format!("{:?}", config.panel.follow_up_years),
    ]);
    table.add_row(vec![
        "Duplicate keys".to_string(),
        format!("{:?}", config.reference.duplicate_keys),
    ]);
    table.add_row(vec![
        "Min match rate".to_string(),
        firmpanel_core::fmt_pct(config.merge.min_match_rate),
    ]);
    table.add_row(vec![
        "Staleness check".to_string(),
        config.cache.check_staleness.to_string(),
    ]);
    table.add_row(vec![
        "Compression level".to_string(),
        config.cache.zstd_level.to_string(),
    ]);
    table.add_row(vec![
        "Workers".to_string(),
        format!("{} (max: {})", pipeline.workers(), config.workers.max),
    ]);
    table.add_row(vec![
        "Deadline".to_string(),
        config
            .cancel
            .deadline_secs
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "none".to_string()),
    ]);

    eprintln!("\n{table}");
}

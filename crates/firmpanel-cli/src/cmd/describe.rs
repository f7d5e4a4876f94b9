//! `firmpanel describe` - summary statistics table

use anyhow::Result;
use clap::Args;
use firmpanel_core::Role;
use firmpanel_pipeline::{Pipeline, render, summary_stats, write_summary_csv};

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Rebuild the merged tables before describing them
    #[arg(long)]
    pub rebuild: bool,
}

pub fn run(args: DescribeArgs, pipeline: &Pipeline) -> Result<()> {
    let (survival, _) = pipeline.merged_survival(args.rebuild)?;
    let (combined, _) = pipeline.merged_combined(args.rebuild)?;

    let rows = summary_stats(&survival, &combined, &pipeline.survival_layout());
    eprintln!("\n{}", render(&rows));
    write_summary_csv(&rows, pipeline.paths().get(Role::Tables))?;
    Ok(())
}

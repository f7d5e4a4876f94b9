//! `firmpanel merge` - county measures onto survival and panel rows

use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color};
use firmpanel_core::{fmt_num, fmt_pct};
use firmpanel_merge::MergeReport;
use firmpanel_pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Survival,
    Combined,
    All,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Which merged table to produce
    #[arg(long, value_enum, default_value_t = Target::All)]
    pub target: Target,

    /// Rebuild the merged tables and everything upstream
    #[arg(long)]
    pub rebuild: bool,
}

pub fn run(args: MergeArgs, pipeline: &Pipeline) -> Result<()> {
    let min = pipeline.config().merge.min_match_rate;
    let mut reports = Vec::new();

    if matches!(args.target, Target::Survival | Target::All) {
        let (_, report) = pipeline.merged_survival(args.rebuild)?;
        reports.push(("survival_merged", report));
    }
    if matches!(args.target, Target::Combined | Target::All) {
        let (_, report) = pipeline.merged_combined(args.rebuild)?;
        reports.push(("combined_merged", report));
    }

    let mut table = super::table(&["Table", "Rows", "Matched", "Match rate"]);
    for (name, report) in &reports {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(fmt_num(report.rows)),
            Cell::new(fmt_num(report.matched)),
            rate_cell(report),
        ]);
    }
    eprintln!("\n{table}");

    for (name, report) in reports.iter().filter(|(_, r)| r.low_match_rate) {
        log::warn!(
            "{name}: match rate {} below minimum {}",
            fmt_pct(report.match_rate),
            fmt_pct(min)
        );
    }
    Ok(())
}

fn rate_cell(report: &MergeReport) -> Cell {
    let cell = Cell::new(fmt_pct(report.match_rate));
    if report.low_match_rate {
        cell.fg(Color::Yellow)
    } else {
        cell.fg(Color::Green)
    }
}

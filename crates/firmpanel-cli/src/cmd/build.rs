//! `firmpanel build` - panel and survival tables

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use firmpanel_core::fmt_num;
use firmpanel_pipeline::Pipeline;

use super::store::status;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Rebuild every artifact instead of loading cached ones
    #[arg(long)]
    pub rebuild: bool,
}

pub fn run(args: BuildArgs, pipeline: &Pipeline) -> Result<()> {
    let (panel, survival) = pipeline.load_data(args.rebuild)?;
    let layout = pipeline.survival_layout();

    let mut table = super::table(&["Follow-up", "Survivors", "Share"]);
    for &year in &layout.follow_up_years {
        let survivors = survival
            .iter()
            .filter(|r| r.survived_in(&layout, year) == Some(1))
            .count();
        let share = if survival.is_empty() {
            0.0
        } else {
            survivors as f64 / survival.len() as f64
        };
        table.add_row(vec![
            Cell::new(year),
            Cell::new(fmt_num(survivors)),
            Cell::new(firmpanel_core::fmt_pct(share)),
        ]);
    }

    eprintln!(
        "\nPanel: {} rows; survival: {} baseline entities ({})",
        fmt_num(panel.len()),
        fmt_num(survival.len()),
        layout.baseline_year
    );
    eprintln!("{table}");
    status(&pipeline.store()?)
}

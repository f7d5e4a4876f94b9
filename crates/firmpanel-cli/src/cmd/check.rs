//! `firmpanel check` - column contract of the cached merged tables

use anyhow::{Result, bail};
use comfy_table::{Cell, Color};
use firmpanel_core::{fmt_num, read_parquet};
use firmpanel_pipeline::{Contract, Pipeline};
use firmpanel_store::{ArtifactName, Lookup};

pub fn run(pipeline: &Pipeline) -> Result<()> {
    let store = pipeline.store()?;
    let targets = [
        (
            ArtifactName::SurvivalMerged,
            Contract::merged_survival(&pipeline.survival_layout()),
        ),
        (ArtifactName::CombinedMerged, Contract::merged_combined()),
    ];

    let mut table = super::table(&["Table", "Rows", "Status"]);
    let mut failed = 0;
    for (artifact, contract) in &targets {
        let generation = match store.lookup(*artifact)? {
            Lookup::Present(generation) => generation,
            Lookup::Absent => {
                table.add_row(vec![
                    Cell::new(artifact),
                    Cell::new("-"),
                    Cell::new("not built").fg(Color::DarkGrey),
                ]);
                continue;
            }
        };

        log::debug!("{artifact}: checking {}", generation.name());
        let (schema, batches) = read_parquet(&generation.parquet())?;
        let violations = contract.check_batches(&schema, &batches);
        let status = if violations.is_empty() {
            Cell::new("OK").fg(Color::Green)
        } else {
            failed += 1;
            Cell::new(format!("{} violations", violations.len())).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(artifact),
            Cell::new(fmt_num(generation.manifest.row_count)),
            status,
        ]);
        for violation in &violations {
            eprintln!("  {artifact}: {violation}");
        }
    }

    eprintln!("\n{table}");
    if failed > 0 {
        bail!("{failed} merged tables violate the column contract");
    }
    Ok(())
}

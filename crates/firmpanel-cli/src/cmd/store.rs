//! `firmpanel status | verify | gc` - inspect and maintain the artifact store

use anyhow::{Result, bail};
use comfy_table::{Cell, Color};
use firmpanel_core::fmt_num;
use firmpanel_store::store::VerifyResult;
use firmpanel_store::{ArtifactState, Store};

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

pub fn status(store: &Store) -> Result<()> {
    let mut table = super::table(&["Artifact", "Generation", "Rows", "Content", "Created", "Lock"]);

    for entry in store.status() {
        let lock = if entry.locked {
            Cell::new("held").fg(Color::Yellow)
        } else {
            Cell::new("")
        };
        let row = match &entry.state {
            ArtifactState::Absent => vec![
                Cell::new(entry.artifact),
                Cell::new("not built").fg(Color::DarkGrey),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                lock,
            ],
            ArtifactState::Present {
                generation,
                row_count,
                content_hash,
                created_at,
            } => vec![
                Cell::new(entry.artifact),
                Cell::new(generation).fg(Color::Green),
                Cell::new(fmt_num(*row_count)),
                Cell::new(content_hash),
                Cell::new(created_at),
                lock,
            ],
            ArtifactState::Unreadable(reason) => vec![
                Cell::new(entry.artifact),
                Cell::new(reason).fg(Color::Red),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                lock,
            ],
        };
        table.add_row(row);
    }

    eprintln!("\n{table}");
    eprintln!("Store: {}", store.base().display());
    Ok(())
}

pub fn gc(store: &Store, confirm: bool) -> Result<()> {
    if !confirm {
        let entries = store.list()?;
        let unreferenced: Vec<_> = entries.iter().filter(|e| !e.referenced).collect();

        if unreferenced.is_empty() {
            eprintln!("No unreferenced generations to remove.");
        } else {
            let mut table = super::table(&["Generation", "Artifact", "Rows", "Created"]);
            for entry in &unreferenced {
                table.add_row(vec![
                    Cell::new(&entry.generation),
                    Cell::new(entry.artifact),
                    Cell::new(fmt_num(entry.row_count)),
                    Cell::new(&entry.created_at),
                ]);
            }

            eprintln!(
                "\nWould remove {} unreferenced generations:",
                unreferenced.len()
            );
            eprintln!("{table}");
            eprintln!("Run with --confirm to actually delete.");
        }
        return Ok(());
    }

    let removed = store.gc()?;
    if removed.is_empty() {
        eprintln!("Nothing to clean up.");
    } else {
        eprintln!("Removed {} directories:", removed.len());
        for name in &removed {
            eprintln!("  {name}");
        }
    }
    Ok(())
}

pub fn verify(store: &Store, generation: Option<&str>) -> Result<()> {
    if let Some(generation) = generation {
        let results = store.verify(generation)?;
        if !print_verify_results(generation, &results) {
            bail!("{generation} failed verification");
        }
        return Ok(());
    }

    let all = store.verify_all()?;
    if all.is_empty() {
        eprintln!("No generations to verify.");
        return Ok(());
    }

    let mut table = super::table(&["Generation", "Files", "Status"]);
    let mut all_ok = true;
    for (name, results) in &all {
        let ok = results.iter().all(|r| r.ok);
        all_ok &= ok;
        let status_cell = if ok {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        table.add_row(vec![Cell::new(name), Cell::new(results.len()), status_cell]);
    }

    eprintln!("\n{table}");

    // Show mismatch details after summary table
    for (name, results) in &all {
        print_mismatches(name, results);
    }

    if all_ok {
        eprintln!("All generations verified OK.");
        Ok(())
    } else {
        bail!("some generations have integrity issues")
    }
}

fn print_verify_results(generation: &str, results: &[VerifyResult]) -> bool {
    let all_ok = results.iter().all(|r| r.ok);
    let status = if all_ok { "OK" } else { "FAIL" };
    eprintln!("[{status}] {generation} ({} files)", results.len());

    print_mismatches(generation, results);

    all_ok
}

fn print_mismatches(generation: &str, results: &[VerifyResult]) {
    for r in results {
        if !r.ok {
            eprintln!("  MISMATCH in {generation}: {}", r.path);
            eprintln!("    expected: {}", short(&r.expected));
            eprintln!("    actual:   {}", short(&r.actual));
        }
    }
}

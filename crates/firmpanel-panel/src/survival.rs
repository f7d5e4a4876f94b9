//! Survival flags: presence of each baseline entity in later vintages

use firmpanel_core::fmt_num;
use rustc_hash::FxHashSet;

use crate::record::{SurvivalLayout, SurvivalRecord, YearlyRecord};

/// Derive one [`SurvivalRecord`] per distinct baseline `abi`.
///
/// Each follow-up year is flagged independently from a set of the `abi`s
/// present in that year's slice; a year with no data flags every entity 0.
/// Duplicate baseline rows collapse to their first occurrence in panel order.
pub fn compute_survival(panel: &[YearlyRecord], layout: &SurvivalLayout) -> Vec<SurvivalRecord> {
    let present: Vec<FxHashSet<&str>> = layout
        .follow_up_years
        .iter()
        .map(|&year| {
            panel
                .iter()
                .filter(|r| r.file_year == year)
                .map(|r| r.abi.as_str())
                .collect()
        })
        .collect();

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut duplicates = 0usize;
    let mut out = Vec::new();

    for row in panel.iter().filter(|r| r.file_year == layout.baseline_year) {
        if !seen.insert(row.abi.as_str()) {
            duplicates += 1;
            continue;
        }
        out.push(SurvivalRecord {
            abi: row.abi.clone(),
            fips: row.fips.clone(),
            employees: row.employees,
            sales: row.sales,
            naics: row.naics.clone(),
            year_established: row.year_established,
            survived: present
                .iter()
                .map(|set| i8::from(set.contains(row.abi.as_str())))
                .collect(),
            naics2: row.naics.as_deref().map(naics2),
            firm_age: row.year_established.map(|y| layout.baseline_year - y),
        });
    }

    if out.is_empty() {
        log::warn!(
            "No rows for baseline year {} in a panel of {} rows; survival set is empty",
            layout.baseline_year,
            fmt_num(panel.len())
        );
        return out;
    }
    if duplicates > 0 {
        log::info!(
            "Collapsed {} duplicate baseline rows to first occurrence",
            fmt_num(duplicates)
        );
    }
    for (year, set) in layout.follow_up_years.iter().zip(&present) {
        if set.is_empty() {
            log::warn!("No panel data for follow-up year {year}; all flags are 0");
        }
    }
    log::info!(
        "Survival: {} baseline entities ({})",
        fmt_num(out.len()),
        layout.baseline_year
    );

    out
}

/// Two-digit sector: the first two characters of a NAICS code.
fn naics2(naics: &str) -> String {
    naics.chars().take(2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(abi: &str, year: i32) -> YearlyRecord {
        YearlyRecord {
            abi: abi.into(),
            fips: "06037".into(),
            status_code: None,
            year_established: Some(2010),
            employees: Some(3),
            sales: Some(100.0),
            naics: Some("541110".into()),
            file_year: year,
        }
    }

    fn layout() -> SurvivalLayout {
        SurvivalLayout::new(2019, &[2020, 2021, 2022, 2023, 2024])
    }

    #[test]
    fn flags_follow_presence() {
        let panel = vec![row("A100", 2019), row("B200", 2019), row("A100", 2021)];
        let out = compute_survival(&panel, &layout());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].abi, "A100");
        assert_eq!(out[0].survived, [0, 1, 0, 0, 0]);
        assert_eq!(out[1].survived, [0, 0, 0, 0, 0]);
    }

    #[test]
    fn flags_are_independent_per_year() {
        let panel = vec![row("A100", 2019), row("A100", 2022), row("A100", 2024)];
        let out = compute_survival(&panel, &layout());
        assert_eq!(out[0].survived, [0, 0, 1, 0, 1]);
    }

    #[test]
    fn derived_fields() {
        let mut base = row("A100", 2019);
        base.naics = Some("4".into());
        base.year_established = Some(2021);
        let out = compute_survival(&[base], &layout());
        assert_eq!(out[0].naics2.as_deref(), Some("4"));
        assert_eq!(out[0].firm_age, Some(-2));

        let mut base = row("B200", 2019);
        base.naics = None;
        base.year_established = None;
        let out = compute_survival(&[base], &layout());
        assert_eq!(out[0].naics2, None);
        assert_eq!(out[0].firm_age, None);
    }

    #[test]
    fn duplicate_baseline_collapses_to_first() {
        let mut first = row("A100", 2019);
        first.employees = Some(1);
        let mut second = row("A100", 2019);
        second.employees = Some(99);
        let out = compute_survival(&[first, second, row("A100", 2020)], &layout());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].employees, Some(1));
        assert_eq!(out[0].survived[0], 1);
    }

    #[test]
    fn empty_panel_is_empty_result() {
        assert!(compute_survival(&[], &layout()).is_empty());
    }

    #[test]
    fn no_baseline_rows_is_empty_result() {
        let panel = vec![row("A100", 2020)];
        assert!(compute_survival(&panel, &layout()).is_empty());
    }
}

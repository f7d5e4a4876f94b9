//! Summary statistics of the merged tables

use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS};
use firmpanel_core::Result;
use firmpanel_merge::merge::{CIVIC, CLUSTERING, EC};
use firmpanel_panel::SurvivalLayout;
use firmpanel_panel::schema::{EMPLOYEES, SALES, survived_column};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::pipeline::{MergedCombined, MergedSurvival};

pub const SUMMARY_FILE: &str = "summary_stats.csv";

/// One row of the summary table. Moments are `None` for an empty sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub variable: String,
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub min: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
}

impl SummaryRow {
    /// Statistics over `values`, which must not contain NaN.
    pub fn of(variable: impl Into<String>, mut values: Vec<f64>) -> Self {
        let variable = variable.into();
        let n = values.len();
        if n == 0 {
            return Self {
                variable,
                n,
                mean: None,
                sd: None,
                min: None,
                median: None,
                max: None,
            };
        }
        values.sort_by(f64::total_cmp);

        let mean = values.iter().sum::<f64>() / n as f64;
        let sd = (n > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        Self {
            variable,
            n,
            mean: Some(mean),
            sd,
            min: values.first().copied(),
            median: Some(median),
            max: values.last().copied(),
        }
    }

    fn cells(&self) -> [String; 6] {
        [
            self.n.to_string(),
            fmt3(self.mean),
            fmt3(self.sd),
            fmt3(self.min),
            fmt3(self.median),
            fmt3(self.max),
        ]
    }
}

fn fmt3(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.3}")).unwrap_or_default()
}

/// Survival outcome, size and social-capital statistics, plus sales growth
/// between the baseline and the last follow-up year.
///
/// The survival sample keeps rows with the outcome, `ec`, employees, sales,
/// county and industry all present; each variable then counts its own
/// non-null values. Growth is taken over entities observed with positive
/// sales in both years of the combined panel.
pub fn summary_stats(
    survival: &MergedSurvival,
    combined: &MergedCombined,
    layout: &SurvivalLayout,
) -> Vec<SummaryRow> {
    let last = layout.follow_up_years.iter().copied().max();

    let sample: Vec<_> = survival
        .iter()
        .filter_map(|(row, measures)| {
            let flag = last.and_then(|y| row.survived_in(layout, y))?;
            let measures = measures?;
            measures.ec?;
            row.employees?;
            row.sales?;
            row.naics.as_ref()?;
            row.naics2.as_ref()?;
            (!row.fips.is_empty()).then_some((row, measures, flag))
        })
        .collect();

    let outcome = last.map_or_else(|| "survived".to_string(), survived_column);
    let mut rows = vec![
        SummaryRow::of(outcome, sample.iter().map(|(_, _, f)| f64::from(*f)).collect()),
        SummaryRow::of(SALES, sample.iter().filter_map(|(r, _, _)| r.sales).collect()),
        SummaryRow::of(
            EMPLOYEES,
            sample
                .iter()
                .filter_map(|(r, _, _)| r.employees.map(f64::from))
                .collect(),
        ),
    ];

    let growth = match last {
        Some(last) => log_sales_change(combined, layout.baseline_year, last),
        None => Vec::new(),
    };
    rows.push(SummaryRow::of("log_sales_change", growth));

    rows.push(SummaryRow::of(EC, sample.iter().filter_map(|(_, m, _)| m.ec).collect()));
    rows.push(SummaryRow::of(
        CLUSTERING,
        sample.iter().filter_map(|(_, m, _)| m.clustering).collect(),
    ));
    rows.push(SummaryRow::of(
        CIVIC,
        sample.iter().filter_map(|(_, m, _)| m.civic).collect(),
    ));
    rows
}

/// `ln(1 + sales_to) - ln(1 + sales_from)` per entity, in `from` order.
///
/// An entity listed more than once in a year contributes its first row.
fn log_sales_change(combined: &MergedCombined, from: i32, to: i32) -> Vec<f64> {
    let mut later: FxHashMap<&str, f64> = FxHashMap::default();
    for row in combined.rows.iter().filter(|r| r.file_year == to) {
        if let Some(sales) = row.sales.filter(|s| *s > 0.0) {
            later.entry(row.abi.as_str()).or_insert(sales);
        }
    }

    let mut seen = FxHashSet::default();
    combined
        .rows
        .iter()
        .filter(|r| r.file_year == from)
        .filter(|r| seen.insert(r.abi.as_str()))
        .filter_map(|r| {
            let base = r.sales.filter(|s| *s > 0.0)?;
            let end = later.get(r.abi.as_str())?;
            Some(end.ln_1p() - base.ln_1p())
        })
        .collect()
}

/// Render rows as a terminal table.
pub fn render(rows: &[SummaryRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            ["Variable", "N", "Mean", "SD", "Min", "Median", "Max"]
                .into_iter()
                .map(|h| Cell::new(h).fg(Color::Cyan)),
        );
    for row in rows {
        let mut cells = vec![Cell::new(&row.variable)];
        cells.extend(row.cells().into_iter().map(Cell::new));
        table.add_row(cells);
    }
    table
}

/// Write rows to `{dir}/summary_stats.csv`; empty cells for missing moments.
pub fn write_summary_csv(rows: &[SummaryRow], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(SUMMARY_FILE);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["variable", "n", "mean", "sd", "min", "median", "max"])?;
    for row in rows {
        let cells = row.cells();
        let record = std::iter::once(row.variable.as_str()).chain(cells.iter().map(String::as_str));
        writer.write_record(record)?;
    }
    writer.flush()?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmpanel_merge::Measures;
    use firmpanel_panel::{SurvivalRecord, YearlyRecord};

    fn survival_row(abi: &str, flag: i8, sales: Option<f64>) -> SurvivalRecord {
        SurvivalRecord {
            abi: abi.into(),
            fips: "06037".into(),
            employees: Some(10),
            sales,
            naics: Some("445110".into()),
            year_established: Some(2000),
            survived: vec![0, flag],
            naics2: Some("44".into()),
            firm_age: Some(19),
        }
    }

    fn measures(ec: Option<f64>) -> Option<Measures> {
        Some(Measures {
            ec,
            clustering: Some(0.1),
            civic: None,
        })
    }

    fn yearly(abi: &str, year: i32, sales: Option<f64>) -> YearlyRecord {
        YearlyRecord {
            abi: abi.into(),
            fips: "06037".into(),
            status_code: None,
            year_established: None,
            employees: None,
            sales,
            naics: None,
            file_year: year,
        }
    }

    #[test]
    fn moments_match_sample_definitions() {
        let row = SummaryRow::of("x", vec![4.0, 1.0, 3.0, 2.0]);
        assert_eq!(row.n, 4);
        assert_eq!(row.mean, Some(2.5));
        assert_eq!(row.median, Some(2.5));
        assert_eq!(row.min, Some(1.0));
        assert_eq!(row.max, Some(4.0));
        // sample variance (n-1) of 1..=4 is 5/3
        assert!((row.sd.unwrap() - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn single_value_has_no_sd() {
        let row = SummaryRow::of("x", vec![7.0]);
        assert_eq!(row.sd, None);
        assert_eq!(row.median, Some(7.0));
    }

    #[test]
    fn empty_sample_is_all_none() {
        let row = SummaryRow::of("x", Vec::new());
        assert_eq!(row.n, 0);
        assert_eq!(row.mean, None);
        assert_eq!(row.cells()[1], "");
    }

    #[test]
    fn summary_rows_in_order_with_sample_filter() {
        let layout = SurvivalLayout::new(2019, &[2020, 2024]);
        let survival = MergedSurvival {
            rows: vec![
                survival_row("A", 1, Some(100.0)),
                survival_row("B", 0, Some(50.0)),
                // dropped: no sales
                survival_row("C", 1, None),
                // dropped: unmatched
                survival_row("D", 1, Some(10.0)),
                // dropped: null ec
                survival_row("E", 1, Some(10.0)),
            ],
            measures: vec![
                measures(Some(0.8)),
                measures(Some(0.6)),
                measures(Some(0.7)),
                None,
                measures(None),
            ],
        };
        let combined = MergedCombined {
            rows: vec![
                yearly("A", 2019, Some(100.0)),
                yearly("B", 2019, Some(0.0)),
                yearly("A", 2024, Some(200.0)),
                yearly("B", 2024, Some(50.0)),
            ],
            measures: vec![None; 4],
        };

        let rows = summary_stats(&survival, &combined, &layout);
        let names: Vec<_> = rows.iter().map(|r| r.variable.as_str()).collect();
        assert_eq!(
            names,
            [
                "survived_2024",
                "sales",
                "employees",
                "log_sales_change",
                "ec",
                "clustering",
                "civic"
            ]
        );
        assert_eq!(rows[0].n, 2);
        assert_eq!(rows[0].mean, Some(0.5));
        assert_eq!(rows[1].max, Some(100.0));
        // only A has positive sales in both years
        assert_eq!(rows[3].n, 1);
        let expected = 200f64.ln_1p() - 100f64.ln_1p();
        assert!((rows[3].mean.unwrap() - expected).abs() < 1e-12);
        assert_eq!(rows[4].median, Some(0.7));
        // civic is null everywhere
        assert_eq!(rows[6].n, 0);
    }

    #[test]
    fn csv_has_header_and_rounded_values() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![SummaryRow::of("sales", vec![1.0, 2.0])];
        write_summary_csv(&rows, dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "variable,n,mean,sd,min,median,max");
        assert_eq!(lines[1], "sales,2,1.500,0.707,1.000,1.500,2.000");
    }

    #[test]
    fn render_has_one_line_per_variable() {
        let rows = vec![SummaryRow::of("ec", vec![0.5])];
        let text = render(&rows).to_string();
        assert!(text.contains("ec"));
        assert!(text.contains("0.500"));
    }
}

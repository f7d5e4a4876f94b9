//! Left join of panel-shaped rows with county measures

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use firmpanel_core::table::{Columnar, f64_array, f64_values};
use firmpanel_core::{Result, fmt_num, fmt_pct};
use firmpanel_panel::{SurvivalRecord, YearlyRecord};

use crate::social_capital::{Measures, SocialCapitalTable};

pub const EC: &str = "ec";
pub const CLUSTERING: &str = "clustering";
pub const CIVIC: &str = "civic";

/// Rows that carry a county key.
pub trait CountyKeyed {
    fn fips(&self) -> &str;
}

impl CountyKeyed for YearlyRecord {
    fn fips(&self) -> &str {
        &self.fips
    }
}

impl CountyKeyed for SurvivalRecord {
    fn fips(&self) -> &str {
        &self.fips
    }
}

/// Outcome of one merge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeReport {
    pub rows: usize,
    /// Left rows whose county carries a non-null `ec`
    pub matched: usize,
    pub match_rate: f64,
    /// Match rate fell below the configured minimum
    pub low_match_rate: bool,
}

impl MergeReport {
    pub fn new(rows: usize, matched: usize, min_match_rate: f64) -> Self {
        let match_rate = if rows == 0 {
            0.0
        } else {
            matched as f64 / rows as f64
        };
        Self {
            rows,
            matched,
            match_rate,
            low_match_rate: rows > 0 && match_rate < min_match_rate,
        }
    }
}

/// Left rows plus the measures of their county, `None` when unmatched.
///
/// Columns are the left type's columns followed by `ec`, `clustering`,
/// `civic`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable<T> {
    pub rows: Vec<T>,
    pub measures: Vec<Option<Measures>>,
}

impl<T> Default for MergedTable<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            measures: Vec::new(),
        }
    }
}

impl<T> MergedTable<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, Option<&Measures>)> {
        self.rows.iter().zip(self.measures.iter().map(Option::as_ref))
    }

    /// Match report of this table, e.g. after loading it from the cache.
    pub fn report(&self, min_match_rate: f64) -> MergeReport {
        MergeReport::new(self.rows.len(), matched(&self.measures), min_match_rate)
    }
}

impl<T: Columnar> MergedTable<T> {
    pub fn fields(layout: &T::Layout) -> Vec<Field> {
        let mut fields = T::fields(layout);
        fields.extend([
            Field::new(EC, DataType::Float64, true),
            Field::new(CLUSTERING, DataType::Float64, true),
            Field::new(CIVIC, DataType::Float64, true),
        ]);
        fields
    }

    pub fn schema(layout: &T::Layout) -> SchemaRef {
        Arc::new(Schema::new(Self::fields(layout)))
    }

    pub fn to_batch(&self, layout: &T::Layout) -> Result<RecordBatch> {
        let mut columns: Vec<ArrayRef> = T::columns(layout, &self.rows);
        columns.push(f64_array(self.measures.iter().map(|m| m.and_then(|m| m.ec))));
        columns.push(f64_array(
            self.measures.iter().map(|m| m.and_then(|m| m.clustering)),
        ));
        columns.push(f64_array(self.measures.iter().map(|m| m.and_then(|m| m.civic))));
        Ok(RecordBatch::try_new(Self::schema(layout), columns)?)
    }

    /// Decode a persisted merge. Rows whose three measures are all null
    /// read back as unmatched.
    pub fn decode_all(layout: &T::Layout, batches: &[RecordBatch]) -> Result<Self> {
        let mut out = Self::default();
        for batch in batches {
            out.rows.extend(T::decode(layout, batch)?);
            let ec = f64_values(batch, EC)?;
            let clustering = f64_values(batch, CLUSTERING)?;
            let civic = f64_values(batch, CIVIC)?;
            out.measures.extend(
                ec.into_iter()
                    .zip(clustering)
                    .zip(civic)
                    .map(|((ec, clustering), civic)| {
                        let m = Measures {
                            ec,
                            clustering,
                            civic,
                        };
                        (!m.is_all_null()).then_some(m)
                    }),
            );
        }
        Ok(out)
    }
}

/// Rows counted as matched: those with a non-null `ec`. Counts the same
/// before and after a Parquet round trip.
fn matched(measures: &[Option<Measures>]) -> usize {
    measures
        .iter()
        .filter(|m| m.is_some_and(|m| m.ec.is_some()))
        .count()
}

/// Left-join `rows` with `reference` on the county key.
///
/// Every left row appears exactly once, in left order. The reference table
/// is already deduplicated, so no row can fan out.
pub fn left_join<T: CountyKeyed>(
    rows: Vec<T>,
    reference: &SocialCapitalTable,
    min_match_rate: f64,
) -> (MergedTable<T>, MergeReport) {
    let index = reference.index();
    let measures: Vec<Option<Measures>> = rows
        .iter()
        .map(|r| index.get(r.fips()).map(|m| **m))
        .collect();
    let report = MergeReport::new(rows.len(), matched(&measures), min_match_rate);

    if report.rows > 0 {
        log::info!(
            "Merge rate: {} ({}/{})",
            fmt_pct(report.match_rate),
            fmt_num(report.matched),
            fmt_num(report.rows)
        );
    }
    if report.low_match_rate {
        log::warn!(
            "Low match rate: {} below minimum {}",
            fmt_pct(report.match_rate),
            fmt_pct(min_match_rate)
        );
    }

    (MergedTable { rows, measures }, report)
}

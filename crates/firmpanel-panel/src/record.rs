//! Panel and survival row types

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::Field;
use firmpanel_core::Result;
use firmpanel_core::table::{
    Columnar, f64_array, f64_values, i8_array, i8_values, i32_array, i32_values, utf8_array,
    utf8_required, utf8_values,
};

use crate::schema;

/// One business location observed in one source vintage.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyRecord {
    pub abi: String,
    /// Zero-padded 5-character county code.
    pub fips: String,
    pub status_code: Option<String>,
    pub year_established: Option<i32>,
    pub employees: Option<i32>,
    pub sales: Option<f64>,
    pub naics: Option<String>,
    pub file_year: i32,
}

impl Columnar for YearlyRecord {
    type Layout = ();

    fn fields(_: &()) -> Vec<Field> {
        schema::panel_fields()
    }

    fn columns(_: &(), rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            utf8_array(rows.iter().map(|r| Some(r.abi.as_str()))),
            utf8_array(rows.iter().map(|r| Some(r.fips.as_str()))),
            utf8_array(rows.iter().map(|r| r.status_code.as_deref())),
            i32_array(rows.iter().map(|r| r.year_established)),
            i32_array(rows.iter().map(|r| r.employees)),
            f64_array(rows.iter().map(|r| r.sales)),
            utf8_array(rows.iter().map(|r| r.naics.as_deref())),
            i32_array(rows.iter().map(|r| Some(r.file_year))),
        ]
    }

    fn decode(_: &(), batch: &RecordBatch) -> Result<Vec<Self>> {
        let abi = utf8_required(batch, schema::ABI)?;
        let fips = utf8_required(batch, schema::FIPS)?;
        let mut status_code = utf8_values(batch, schema::STATUS_CODE)?;
        let year_established = i32_values(batch, schema::YEAR_ESTABLISHED)?;
        let employees = i32_values(batch, schema::EMPLOYEES)?;
        let sales = f64_values(batch, schema::SALES)?;
        let mut naics = utf8_values(batch, schema::NAICS)?;
        let file_year = i32_values(batch, schema::FILE_YEAR)?;

        let rows = abi
            .into_iter()
            .zip(fips)
            .enumerate()
            .map(|(i, (abi, fips))| YearlyRecord {
                abi,
                fips,
                status_code: status_code[i].take(),
                year_established: year_established[i],
                employees: employees[i],
                sales: sales[i],
                naics: naics[i].take(),
                file_year: file_year[i].unwrap_or_default(),
            })
            .collect();
        Ok(rows)
    }
}

/// Column layout of the survival table: which follow-up years get a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurvivalLayout {
    pub baseline_year: i32,
    pub follow_up_years: Vec<i32>,
}

impl SurvivalLayout {
    pub fn new(baseline_year: i32, follow_up_years: &[i32]) -> Self {
        Self {
            baseline_year,
            follow_up_years: follow_up_years.to_vec(),
        }
    }

    /// Position of `year` in the flag vector.
    pub fn flag_index(&self, year: i32) -> Option<usize> {
        self.follow_up_years.iter().position(|&y| y == year)
    }
}

/// One baseline entity with its presence flags in each follow-up year.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalRecord {
    pub abi: String,
    pub fips: String,
    pub employees: Option<i32>,
    pub sales: Option<f64>,
    pub naics: Option<String>,
    pub year_established: Option<i32>,
    /// Aligned with [`SurvivalLayout::follow_up_years`]; each value is 0 or 1.
    pub survived: Vec<i8>,
    pub naics2: Option<String>,
    /// Baseline year minus year established. Not validated.
    pub firm_age: Option<i32>,
}

impl SurvivalRecord {
    /// Flag for `year` under `layout`, `None` if the year is not tracked.
    pub fn survived_in(&self, layout: &SurvivalLayout, year: i32) -> Option<i8> {
        layout
            .flag_index(year)
            .and_then(|i| self.survived.get(i).copied())
    }
}

impl Columnar for SurvivalRecord {
    type Layout = SurvivalLayout;

    fn fields(layout: &SurvivalLayout) -> Vec<Field> {
        schema::survival_fields(&layout.follow_up_years)
    }

    fn columns(layout: &SurvivalLayout, rows: &[Self]) -> Vec<ArrayRef> {
        let mut cols = vec![
            utf8_array(rows.iter().map(|r| Some(r.abi.as_str()))),
            utf8_array(rows.iter().map(|r| Some(r.fips.as_str()))),
            i32_array(rows.iter().map(|r| r.employees)),
            f64_array(rows.iter().map(|r| r.sales)),
            utf8_array(rows.iter().map(|r| r.naics.as_deref())),
            i32_array(rows.iter().map(|r| r.year_established)),
        ];
        for i in 0..layout.follow_up_years.len() {
            cols.push(i8_array(
                rows.iter()
                    .map(move |r| Some(r.survived.get(i).copied().unwrap_or(0))),
            ));
        }
        cols.push(utf8_array(rows.iter().map(|r| r.naics2.as_deref())));
        cols.push(i32_array(rows.iter().map(|r| r.firm_age)));
        cols
    }

    fn decode(layout: &SurvivalLayout, batch: &RecordBatch) -> Result<Vec<Self>> {
        let abi = utf8_required(batch, schema::ABI)?;
        let fips = utf8_required(batch, schema::FIPS)?;
        let employees = i32_values(batch, schema::EMPLOYEES)?;
        let sales = f64_values(batch, schema::SALES)?;
        let mut naics = utf8_values(batch, schema::NAICS)?;
        let year_established = i32_values(batch, schema::YEAR_ESTABLISHED)?;
        let flags = layout
            .follow_up_years
            .iter()
            .map(|&y| i8_values(batch, &schema::survived_column(y)))
            .collect::<Result<Vec<_>>>()?;
        let mut naics2 = utf8_values(batch, schema::NAICS2)?;
        let firm_age = i32_values(batch, schema::FIRM_AGE)?;

        let rows = abi
            .into_iter()
            .zip(fips)
            .enumerate()
            .map(|(i, (abi, fips))| SurvivalRecord {
                abi,
                fips,
                employees: employees[i],
                sales: sales[i],
                naics: naics[i].take(),
                year_established: year_established[i],
                survived: flags.iter().map(|f| f[i].unwrap_or(0)).collect(),
                naics2: naics2[i].take(),
                firm_age: firm_age[i],
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yearly(abi: &str, year: i32) -> YearlyRecord {
        YearlyRecord {
            abi: abi.into(),
            fips: "06037".into(),
            status_code: None,
            year_established: Some(2001),
            employees: Some(4),
            sales: None,
            naics: Some("541110".into()),
            file_year: year,
        }
    }

    #[test]
    fn yearly_batch_round_trip() {
        let rows = vec![yearly("A100", 2019), yearly("B200", 2020)];
        let batch = YearlyRecord::to_batch(&(), &rows).unwrap();
        assert_eq!(batch.num_columns(), 8);
        assert_eq!(YearlyRecord::decode(&(), &batch).unwrap(), rows);
    }

    #[test]
    fn survival_batch_has_one_flag_column_per_year() {
        let layout = SurvivalLayout::new(2019, &[2020, 2021, 2022]);
        let rows = vec![SurvivalRecord {
            abi: "A100".into(),
            fips: "00006".into(),
            employees: None,
            sales: Some(10.0),
            naics: Some("44".into()),
            year_established: Some(2020),
            survived: vec![0, 1, 0],
            naics2: Some("44".into()),
            firm_age: Some(-1),
        }];
        let batch = SurvivalRecord::to_batch(&layout, &rows).unwrap();
        assert_eq!(batch.num_columns(), 6 + 3 + 2);
        assert!(batch.column_by_name("survived_2021").is_some());

        let back = SurvivalRecord::decode(&layout, &batch).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[0].survived_in(&layout, 2021), Some(1));
        assert_eq!(back[0].survived_in(&layout, 2030), None);
    }

    #[test]
    fn survival_decode_with_untracked_year_fails() {
        let written = SurvivalLayout::new(2019, &[2020]);
        let batch = SurvivalRecord::to_batch(&written, &[]).unwrap();
        let wanted = SurvivalLayout::new(2019, &[2020, 2021]);
        assert!(SurvivalRecord::decode(&wanted, &batch).is_err());
    }
}

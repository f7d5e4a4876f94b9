//! Column contract the downstream analyses rely on

use std::fmt;

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{DataType, Schema};
use firmpanel_core::coerce::FIPS_WIDTH;
use firmpanel_merge::merge::{CIVIC, CLUSTERING, EC};
use firmpanel_panel::SurvivalLayout;
use firmpanel_panel::schema::{
    ABI, EMPLOYEES, FILE_YEAR, FIPS, FIRM_AGE, NAICS, NAICS2, SALES, YEAR_ESTABLISHED,
    survived_column,
};

/// Required columns of one merged table
#[derive(Debug, Clone)]
pub struct Contract {
    pub table: &'static str,
    pub columns: Vec<(String, DataType)>,
}

impl Contract {
    pub fn merged_survival(layout: &SurvivalLayout) -> Self {
        let mut columns = vec![
            (ABI.to_string(), DataType::Utf8),
            (FIPS.to_string(), DataType::Utf8),
            (EMPLOYEES.to_string(), DataType::Int32),
            (SALES.to_string(), DataType::Float64),
            (NAICS.to_string(), DataType::Utf8),
            (NAICS2.to_string(), DataType::Utf8),
            (YEAR_ESTABLISHED.to_string(), DataType::Int32),
            (FIRM_AGE.to_string(), DataType::Int32),
        ];
        columns.extend(
            layout
                .follow_up_years
                .iter()
                .map(|&y| (survived_column(y), DataType::Int8)),
        );
        columns.extend(measure_columns());
        Self {
            table: "survival_merged",
            columns,
        }
    }

    pub fn merged_combined() -> Self {
        let mut columns = vec![
            (ABI.to_string(), DataType::Utf8),
            (FIPS.to_string(), DataType::Utf8),
            (SALES.to_string(), DataType::Float64),
            (EMPLOYEES.to_string(), DataType::Int32),
            (NAICS.to_string(), DataType::Utf8),
            (FILE_YEAR.to_string(), DataType::Int32),
        ];
        columns.extend(measure_columns());
        Self {
            table: "combined_merged",
            columns,
        }
    }

    /// Missing or mistyped columns of `schema`.
    pub fn validate(&self, schema: &Schema) -> Vec<Violation> {
        self.columns
            .iter()
            .filter_map(|(name, expected)| match schema.field_with_name(name) {
                Err(_) => Some(Violation::Missing(name.clone())),
                Ok(field) if field.data_type() != expected => Some(Violation::WrongType {
                    column: name.clone(),
                    expected: expected.clone(),
                    found: field.data_type().clone(),
                }),
                Ok(_) => None,
            })
            .collect()
    }

    /// Schema violations plus identifier violations in the data itself:
    /// null `abi`, or a `fips` that is null or not a 5-character code.
    pub fn check_batches(&self, schema: &Schema, batches: &[RecordBatch]) -> Vec<Violation> {
        let mut violations = self.validate(schema);
        if !violations.is_empty() {
            return violations;
        }

        let mut null_abi = 0;
        let mut bad_fips = 0;
        for batch in batches {
            if let Some(abi) = batch.column_by_name(ABI) {
                null_abi += abi.null_count();
            }
            if let Some(fips) = batch.column_by_name(FIPS) {
                bad_fips += fips
                    .as_string::<i32>()
                    .iter()
                    .filter(|v| v.map_or(true, |s| s.len() != FIPS_WIDTH))
                    .count();
            }
        }
        if null_abi > 0 {
            violations.push(Violation::NullIdentifier {
                column: ABI,
                rows: null_abi,
            });
        }
        if bad_fips > 0 {
            violations.push(Violation::BadCountyCode { rows: bad_fips });
        }
        violations
    }
}

fn measure_columns() -> [(String, DataType); 3] {
    [
        (EC.to_string(), DataType::Float64),
        (CLUSTERING.to_string(), DataType::Float64),
        (CIVIC.to_string(), DataType::Float64),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Missing(String),
    WrongType {
        column: String,
        expected: DataType,
        found: DataType,
    },
    NullIdentifier {
        column: &'static str,
        rows: usize,
    },
    BadCountyCode {
        rows: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(column) => write!(f, "missing column {column}"),
            Self::WrongType {
                column,
                expected,
                found,
            } => write!(f, "column {column}: expected {expected}, found {found}"),
            Self::NullIdentifier { column, rows } => {
                write!(f, "{rows} rows with null {column}")
            }
            Self::BadCountyCode { rows } => {
                write!(f, "{rows} rows whose fips is not a {FIPS_WIDTH}-character code")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::Field;

    fn combined_batch(fips: Vec<Option<&str>>) -> RecordBatch {
        let n = fips.len();
        let schema = Arc::new(Schema::new(vec![
            Field::new(ABI, DataType::Utf8, false),
            Field::new(FIPS, DataType::Utf8, true),
            Field::new(SALES, DataType::Float64, true),
            Field::new(EMPLOYEES, DataType::Int32, true),
            Field::new(NAICS, DataType::Utf8, true),
            Field::new(FILE_YEAR, DataType::Int32, false),
            Field::new(EC, DataType::Float64, true),
            Field::new(CLUSTERING, DataType::Float64, true),
            Field::new(CIVIC, DataType::Float64, true),
        ]));
        let floats = || Arc::new(Float64Array::from(vec![None; n])) as _;
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["A"; n])),
                Arc::new(StringArray::from(fips)),
                floats(),
                Arc::new(Int32Array::from(vec![None; n])),
                Arc::new(StringArray::from(vec![None::<&str>; n])),
                Arc::new(Int32Array::from(vec![2019; n])),
                floats(),
                floats(),
                floats(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn survival_contract_lists_every_flag() {
        let layout = SurvivalLayout::new(2019, &[2020, 2024]);
        let contract = Contract::merged_survival(&layout);
        let names: Vec<_> = contract.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"survived_2020"));
        assert!(names.contains(&"survived_2024"));
        assert!(names.contains(&"civic"));
    }

    #[test]
    fn valid_combined_batch_passes() {
        let batch = combined_batch(vec![Some("06037"), Some("01001")]);
        let contract = Contract::merged_combined();
        assert!(contract.check_batches(&batch.schema(), &[batch]).is_empty());
    }

    #[test]
    fn missing_and_mistyped_columns() {
        let schema = Schema::new(vec![
            Field::new(ABI, DataType::Utf8, false),
            Field::new(FIPS, DataType::Int32, false),
        ]);
        let violations = Contract::merged_combined().validate(&schema);
        assert!(violations.contains(&Violation::Missing(SALES.into())));
        assert!(violations.contains(&Violation::WrongType {
            column: FIPS.into(),
            expected: DataType::Utf8,
            found: DataType::Int32,
        }));
    }

    #[test]
    fn short_or_null_fips_flagged() {
        let batch = combined_batch(vec![Some("6037"), None, Some("06037")]);
        let violations = Contract::merged_combined().check_batches(&batch.schema(), &[batch]);
        assert_eq!(violations, vec![Violation::BadCountyCode { rows: 2 }]);
    }
}

//! Canonical column names for source extracts and persisted panel tables

use arrow::datatypes::{DataType, Field};

/// Source header names, after trim + uppercase normalization.
pub mod source {
    pub const ABI: &str = "ABI";
    pub const FIPS: &str = "FIPS CODE";
    pub const STATUS_CODE: &str = "BUSINESS STATUS CODE";
    pub const YEAR_ESTABLISHED: &str = "YEAR ESTABLISHED";
    pub const EMPLOYEES: &str = "EMPLOYEE SIZE (5) - LOCATION";
    pub const SALES: &str = "SALES VOLUME (9) - LOCATION";
    pub const NAICS: &str = "PRIMARY NAICS CODE";

    /// Columns without which a file cannot feed joins or survival tracking.
    pub const REQUIRED: [&str; 2] = [ABI, FIPS];

    pub const OPTIONAL: [&str; 5] = [STATUS_CODE, YEAR_ESTABLISHED, EMPLOYEES, SALES, NAICS];
}

/// Normalize a header cell so vintages with different casing compare equal.
pub fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_uppercase()
}

pub const ABI: &str = "abi";
pub const FIPS: &str = "fips";
pub const STATUS_CODE: &str = "status_code";
pub const YEAR_ESTABLISHED: &str = "year_established";
pub const EMPLOYEES: &str = "employees";
pub const SALES: &str = "sales";
pub const NAICS: &str = "naics";
pub const FILE_YEAR: &str = "file_year";
pub const NAICS2: &str = "naics2";
pub const FIRM_AGE: &str = "firm_age";

/// Column name of the survival flag for `year`.
pub fn survived_column(year: i32) -> String {
    format!("survived_{year}")
}

/// Panel table: one row per business location per vintage
pub fn panel_fields() -> Vec<Field> {
    vec![
        Field::new(ABI, DataType::Utf8, false),
        Field::new(FIPS, DataType::Utf8, false),
        Field::new(STATUS_CODE, DataType::Utf8, true),
        Field::new(YEAR_ESTABLISHED, DataType::Int32, true),
        Field::new(EMPLOYEES, DataType::Int32, true),
        Field::new(SALES, DataType::Float64, true),
        Field::new(NAICS, DataType::Utf8, true),
        Field::new(FILE_YEAR, DataType::Int32, false),
    ]
}

/// Survival table: baseline fields, one flag per follow-up year, derived fields
pub fn survival_fields(follow_up_years: &[i32]) -> Vec<Field> {
    let mut fields = vec![
        Field::new(ABI, DataType::Utf8, false),
        Field::new(FIPS, DataType::Utf8, false),
        Field::new(EMPLOYEES, DataType::Int32, true),
        Field::new(SALES, DataType::Float64, true),
        Field::new(NAICS, DataType::Utf8, true),
        Field::new(YEAR_ESTABLISHED, DataType::Int32, true),
    ];
    fields.extend(
        follow_up_years
            .iter()
            .map(|&y| Field::new(survived_column(y), DataType::Int8, false)),
    );
    fields.push(Field::new(NAICS2, DataType::Utf8, true));
    fields.push(Field::new(FIRM_AGE, DataType::Int32, true));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_header_case_and_space() {
        assert_eq!(normalize_header(" Fips Code "), "FIPS CODE");
        assert_eq!(normalize_header("abi"), "ABI");
    }

    #[test]
    fn normalize_header_strips_bom() {
        assert_eq!(normalize_header("\u{feff}Abi"), "ABI");
    }

    #[test]
    fn panel_schema_has_expected_fields() {
        let names: Vec<_> = panel_fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(
            names,
            [
                "abi",
                "fips",
                "status_code",
                "year_established",
                "employees",
                "sales",
                "naics",
                "file_year"
            ]
        );
    }

    #[test]
    fn survival_schema_flags_in_year_order() {
        let fields = survival_fields(&[2020, 2021]);
        let names: Vec<_> = fields.iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            [
                "abi",
                "fips",
                "employees",
                "sales",
                "naics",
                "year_established",
                "survived_2020",
                "survived_2021",
                "naics2",
                "firm_age"
            ]
        );
        assert_eq!(fields[6].data_type(), &DataType::Int8);
        assert!(!fields[6].is_nullable());
    }
}

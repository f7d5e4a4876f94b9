//! Reference file on disk joined onto panel rows

use firmpanel_core::Error;
use firmpanel_merge::{DuplicateKeyPolicy, left_join, load_social_capital};
use firmpanel_panel::YearlyRecord;
use tempfile::TempDir;

fn row(abi: &str, fips: &str) -> YearlyRecord {
    YearlyRecord {
        abi: abi.into(),
        fips: fips.into(),
        status_code: None,
        year_established: Some(2000),
        employees: Some(5),
        sales: Some(10.0),
        naics: Some("44".into()),
        file_year: 2019,
    }
}

fn reference_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("social_capital_county.csv");
    std::fs::write(
        &path,
        "county,county_name,num_below_p50,ec_county,clustering_county,civic_organizations_county\n\
         1001,Autauga,100,0.78,0.11,0.012\n\
         1001,Autauga,100,0.99,0.99,0.99\n\
         6037,Los Angeles,9000,0.85,0.09,0.008\n",
    )
    .unwrap();
    path
}

#[test]
fn duplicate_reference_keys_do_not_fan_out() {
    let dir = TempDir::new().unwrap();
    let table = load_social_capital(&reference_file(&dir), DuplicateKeyPolicy::KeepFirst).unwrap();
    assert_eq!(table.duplicates, 1);

    let rows = vec![row("A100", "01001"), row("B200", "01001"), row("C300", "48201")];
    let (merged, report) = left_join(rows, &table, 0.9);

    assert_eq!(merged.len(), 3);
    assert_eq!(report.matched, 2);
    assert!(report.low_match_rate);
    assert_eq!(merged.measures[0].unwrap().ec, Some(0.78));
    assert_eq!(merged.measures[1].unwrap().ec, Some(0.78));
    assert!(merged.measures[2].is_none());
}

#[test]
fn reject_policy_fails_fast() {
    let dir = TempDir::new().unwrap();
    let err = load_social_capital(&reference_file(&dir), DuplicateKeyPolicy::Reject).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { ref fips, count: 2 } if fips == "01001"));
}

//! Source extract reader: one yearly delimited file → normalized records
//!
//! Parsing is best-effort. Undecodable rows are dropped and counted, bad
//! field values become nulls, and only file-level problems (no vintage year,
//! missing key column, I/O) fail the read.

use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

use firmpanel_core::coerce::{self, CoercionStats};
use firmpanel_core::{CancelToken, Error, Result, fmt_num};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;

use crate::config::PanelConfig;
use crate::record::YearlyRecord;
use crate::schema::{normalize_header, source};

/// Rows between cancellation checks and progress updates
const UPDATE_INTERVAL: usize = 10_000;

/// Extract the vintage year from a file name.
///
/// The year is the four ASCII digits immediately preceding `marker`
/// (e.g. `2019_Business_Academic_QCQ.txt` with marker `_Business`).
pub fn vintage_year(path: &Path, marker: &str) -> Result<i32> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    name.match_indices(marker)
        .filter_map(|(pos, _)| name.get(pos.checked_sub(4)?..pos))
        .find(|digits| digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            Error::malformed(
                path,
                format!("no 4-digit vintage year before {marker:?} in file name"),
            )
        })
}

/// Per-file read statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Data rows seen (excluding header)
    pub rows_scanned: usize,
    /// Rows kept in the output
    pub rows_kept: usize,
    /// Rows the delimited reader could not decode
    pub rows_malformed: usize,
    /// Rows dropped for a missing `abi` or `fips`
    pub rows_missing_key: usize,
    /// Individual fields coerced to null
    pub fields_nulled: usize,
}

impl ReadStats {
    pub fn merge(&mut self, other: &ReadStats) {
        self.rows_scanned += other.rows_scanned;
        self.rows_kept += other.rows_kept;
        self.rows_malformed += other.rows_malformed;
        self.rows_missing_key += other.rows_missing_key;
        self.fields_nulled += other.fields_nulled;
    }
}

/// All records of one source vintage
#[derive(Debug, Clone)]
pub struct YearlySet {
    pub year: i32,
    pub path: PathBuf,
    pub records: Vec<YearlyRecord>,
    pub stats: ReadStats,
}

/// Header positions of the canonical source columns
#[derive(Debug, Default)]
struct ColumnIndex {
    by_name: FxHashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn from_headers(path: &Path, headers: &csv::ByteRecord) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| normalize_header(&String::from_utf8_lossy(h)))
            .collect();

        let mut by_name = FxHashMap::default();
        for name in source::REQUIRED.iter().chain(source::OPTIONAL.iter()) {
            if let Some(pos) = normalized.iter().position(|h| h == name) {
                by_name.insert(*name, pos);
            }
        }

        for name in source::REQUIRED {
            if !by_name.contains_key(name) {
                return Err(Error::malformed(path, format!("missing column {name:?}")));
            }
        }
        for name in source::OPTIONAL {
            if !by_name.contains_key(name) {
                log::warn!(
                    "{}: no {name:?} column, field will be null",
                    path.display()
                );
            }
        }
        Ok(Self { by_name })
    }

    fn get<'r>(&self, record: &'r csv::ByteRecord, name: &str) -> Option<Cow<'r, str>> {
        let pos = *self.by_name.get(name)?;
        record.get(pos).map(String::from_utf8_lossy)
    }
}

/// Read one yearly extract file.
///
/// The vintage is taken from the file name; failing that the whole file is
/// `MalformedInput`. No output is written.
pub fn read_extract(
    path: &Path,
    config: &PanelConfig,
    cancel: &CancelToken,
    pb: &ProgressBar,
) -> Result<YearlySet> {
    let year = vintage_year(path, &config.year_marker)?;
    cancel.check()?;

    let file = File::open(path)?;
    pb.set_length(file.metadata()?.len());
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter_byte())
        .flexible(true)
        .has_headers(true)
        .from_reader(pb.wrap_read(file));

    let headers = reader
        .byte_headers()
        .map_err(|e| Error::malformed(path, format!("unreadable header: {e}")))?
        .clone();
    let index = ColumnIndex::from_headers(path, &headers)?;

    let mut stats = ReadStats::default();
    let mut coercion = CoercionStats::default();
    let mut records = Vec::new();
    let mut row = csv::ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                stats.rows_scanned += 1;
                stats.rows_malformed += 1;
                log::debug!("{}: dropping row: {e}", path.display());
                continue;
            }
        }
        stats.rows_scanned += 1;

        if stats.rows_scanned % UPDATE_INTERVAL == 0 {
            cancel.check()?;
            pb.set_message(format!("{} rows", fmt_num(records.len())));
        }

        let abi = coerce::text(index.get(&row, source::ABI).as_deref());
        let fips = coerce::text(index.get(&row, source::FIPS).as_deref())
            .map(|code| coerce::zero_pad_fips(&code));
        let (Some(abi), Some(fips)) = (abi, fips) else {
            stats.rows_missing_key += 1;
            continue;
        };

        records.push(YearlyRecord {
            abi,
            fips,
            status_code: coerce::text(index.get(&row, source::STATUS_CODE).as_deref()),
            year_established: coercion.fold(
                index.get(&row, source::YEAR_ESTABLISHED).as_deref(),
                coerce::to_i32,
            ),
            employees: coercion.fold(
                index.get(&row, source::EMPLOYEES).as_deref(),
                coerce::to_i32,
            ),
            sales: coercion.fold(index.get(&row, source::SALES).as_deref(), coerce::to_f64),
            naics: coerce::text(index.get(&row, source::NAICS).as_deref()),
            file_year: year,
        });
    }

    stats.rows_kept = records.len();
    stats.fields_nulled = coercion.failures;
    pb.finish_and_clear();

    log::info!(
        "{} ({year}): {} rows kept of {}",
        path.display(),
        fmt_num(stats.rows_kept),
        fmt_num(stats.rows_scanned),
    );
    if stats.rows_malformed + stats.rows_missing_key + stats.fields_nulled > 0 {
        log::warn!(
            "{}: {} malformed rows, {} rows without abi/fips, {} fields nulled",
            path.display(),
            stats.rows_malformed,
            stats.rows_missing_key,
            stats.fields_nulled,
        );
    }

    Ok(YearlySet {
        year,
        path: path.to_path_buf(),
        records,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn read(path: &Path) -> Result<YearlySet> {
        read_extract(
            path,
            &PanelConfig::default(),
            &CancelToken::new(),
            &ProgressBar::hidden(),
        )
    }

    const HEADER: &str = "ABI,FIPS CODE,BUSINESS STATUS CODE,YEAR ESTABLISHED,\
EMPLOYEE SIZE (5) - LOCATION,SALES VOLUME (9) - LOCATION,PRIMARY NAICS CODE\n";

    #[test]
    fn vintage_year_standard() {
        let p = Path::new("/in/2019_Business_Academic_QCQ.txt");
        assert_eq!(vintage_year(p, "_Business").unwrap(), 2019);
    }

    #[test]
    fn vintage_year_with_prefix() {
        let p = Path::new("data_extract_2023_Business_Academic.txt");
        assert_eq!(vintage_year(p, "_Business").unwrap(), 2023);
    }

    #[test]
    fn vintage_year_missing_is_malformed() {
        let p = Path::new("Business_Academic.txt");
        assert!(matches!(
            vintage_year(p, "_Business"),
            Err(Error::MalformedInput { .. })
        ));
        let p = Path::new("x19_Business_Academic.txt");
        assert!(vintage_year(p, "_Business").is_err());
        let p = Path::new("20a9_Business_Academic.txt");
        assert!(vintage_year(p, "_Business").is_err());
    }

    #[test]
    fn reads_and_normalizes_fields() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2019_Business_Academic.txt",
            &format!("{HEADER}A100,6037,1,1995,12,250.5,541110\n"),
        );
        let set = read(&path).unwrap();
        assert_eq!(set.year, 2019);
        assert_eq!(
            set.records,
            vec![YearlyRecord {
                abi: "A100".into(),
                fips: "06037".into(),
                status_code: Some("1".into()),
                year_established: Some(1995),
                employees: Some(12),
                sales: Some(250.5),
                naics: Some("541110".into()),
                file_year: 2019,
            }]
        );
    }

    #[test]
    fn header_case_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2020_Business_Academic.txt",
            "abi,Fips Code,Primary Naics Code\nA100,6,44\n",
        );
        let set = read(&path).unwrap();
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].fips, "00006");
        assert_eq!(set.records[0].naics.as_deref(), Some("44"));
        assert_eq!(set.records[0].employees, None);
    }

    #[test]
    fn unparseable_numeric_is_null_not_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2019_Business_Academic.txt",
            &format!("{HEADER}A100,06037,1,unknown,N/A,lots,44\n"),
        );
        let set = read(&path).unwrap();
        assert_eq!(set.records.len(), 1);
        let r = &set.records[0];
        assert_eq!(r.employees, None);
        assert_eq!(r.year_established, None);
        assert_eq!(r.sales, None);
        assert_eq!(set.stats.fields_nulled, 3);
    }

    #[test]
    fn rows_missing_key_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2019_Business_Academic.txt",
            &format!("{HEADER},06037,1,2000,1,1,44\nB200,,1,2000,1,1,44\nC300,06001,1,2000,1,1,44\n"),
        );
        let set = read(&path).unwrap();
        let abis: Vec<_> = set.records.iter().map(|r| r.abi.as_str()).collect();
        assert_eq!(abis, ["C300"]);
        assert_eq!(set.stats.rows_missing_key, 2);
        assert_eq!(set.stats.rows_scanned, 3);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2019_Business_Academic.txt",
            &format!("{HEADER}A100,06037\nB200,06001,1,2000,3,9.5,44,extra\n"),
        );
        let set = read(&path).unwrap();
        assert_eq!(set.records.len(), 2);
        assert_eq!(set.records[0].naics, None);
        assert_eq!(set.records[1].employees, Some(3));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("2019_Business_Academic.txt");
        let mut body = HEADER.as_bytes().to_vec();
        body.extend_from_slice(b"A100,06037,\xff,2000,1,1,44\n");
        std::fs::write(&path, body).unwrap();
        let set = read(&path).unwrap();
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].status_code.as_deref(), Some("\u{fffd}"));
    }

    #[test]
    fn missing_key_column_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "2019_Business_Academic.txt", "ABI,NAME\nA100,x\n");
        assert!(matches!(read(&path), Err(Error::MalformedInput { .. })));
    }

    #[test]
    fn header_only_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "2021_Business_Academic.txt", HEADER);
        let set = read(&path).unwrap();
        assert!(set.records.is_empty());
        assert_eq!(set.year, 2021);
    }

    #[test]
    fn cancelled_token_aborts() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "2019_Business_Academic.txt", HEADER);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = read_extract(
            &path,
            &PanelConfig::default(),
            &cancel,
            &ProgressBar::hidden(),
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn tab_delimited() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2019_Business_Academic.txt",
            "ABI\tFIPS CODE\tEMPLOYEE SIZE (5) - LOCATION\nA100\t1001\t7\n",
        );
        let config = PanelConfig {
            delimiter: '\t',
            ..Default::default()
        };
        let set =
            read_extract(&path, &config, &CancelToken::new(), &ProgressBar::hidden()).unwrap();
        assert_eq!(set.records[0].fips, "01001");
        assert_eq!(set.records[0].employees, Some(7));
    }
}

//! County social-capital reference table

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use firmpanel_core::coerce::{self, CoercionStats};
use firmpanel_core::{Error, Result, fmt_num};
use rustc_hash::FxHashMap;

use crate::config::DuplicateKeyPolicy;

/// Source column names (compared after trim + lowercase)
pub mod source {
    pub const COUNTY: &str = "county";
    pub const EC: &str = "ec_county";
    pub const CLUSTERING: &str = "clustering_county";
    pub const CIVIC: &str = "civic_organizations_county";

    pub const REQUIRED: [&str; 4] = [COUNTY, EC, CLUSTERING, CIVIC];
}

/// County-level measures joined onto panel rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measures {
    /// Economic connectedness
    pub ec: Option<f64>,
    pub clustering: Option<f64>,
    pub civic: Option<f64>,
}

impl Measures {
    pub fn is_all_null(&self) -> bool {
        self.ec.is_none() && self.clustering.is_none() && self.civic.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocialCapitalRecord {
    /// Zero-padded 5-character county code.
    pub fips: String,
    pub measures: Measures,
}

/// Reference table with unique county keys, in file order
#[derive(Debug, Clone, Default)]
pub struct SocialCapitalTable {
    pub records: Vec<SocialCapitalRecord>,
    /// Rows dropped because their county key was already present
    pub duplicates: usize,
    /// Rows dropped for an empty county code
    pub missing_key: usize,
    /// Measure fields coerced to null
    pub fields_nulled: usize,
}

impl SocialCapitalTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hashed index by county key.
    pub fn index(&self) -> FxHashMap<&str, &Measures> {
        self.records
            .iter()
            .map(|r| (r.fips.as_str(), &r.measures))
            .collect()
    }
}

/// Load and normalize the county reference file.
///
/// An absent file is `MissingReferenceData`; a header without the county
/// key or any measure column is `MalformedInput`.
pub fn load_social_capital(path: &Path, policy: DuplicateKeyPolicy) -> Result<SocialCapitalTable> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::MissingReferenceData {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| Error::malformed(path, format!("unreadable header: {e}")))?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim()
                .trim_start_matches('\u{feff}')
                .to_lowercase()
        })
        .collect();
    let mut positions = [0usize; 4];
    for (slot, name) in positions.iter_mut().zip(source::REQUIRED) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::malformed(path, format!("missing column {name:?}")))?;
    }
    let [county_at, ec_at, clustering_at, civic_at] = positions;

    let mut table = SocialCapitalTable::default();
    let mut coercion = CoercionStats::default();
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    let mut first_duplicate: Option<String> = None;
    let mut row = csv::ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::debug!("{}: dropping row: {e}", path.display());
                continue;
            }
        }
        let field = |pos: usize| row.get(pos).map(String::from_utf8_lossy);

        let Some(fips) = coerce::text(field(county_at).as_deref()).map(|c| coerce::zero_pad_fips(&c))
        else {
            table.missing_key += 1;
            continue;
        };

        let count = counts.entry(fips.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            table.duplicates += 1;
            first_duplicate.get_or_insert_with(|| fips.clone());
            continue;
        }

        let measures = Measures {
            ec: coercion.fold(field(ec_at).as_deref(), coerce::to_f64),
            clustering: coercion.fold(field(clustering_at).as_deref(), coerce::to_f64),
            civic: coercion.fold(field(civic_at).as_deref(), coerce::to_f64),
        };
        table.records.push(SocialCapitalRecord { fips, measures });
    }
    table.fields_nulled = coercion.failures;

    if let Some(fips) = first_duplicate {
        let count = counts.get(&fips).copied().unwrap_or_default();
        match policy {
            DuplicateKeyPolicy::Reject => return Err(Error::DuplicateKey { fips, count }),
            DuplicateKeyPolicy::KeepFirst => log::warn!(
                "{}: {} duplicate county rows dropped (first: {fips} x{count})",
                path.display(),
                fmt_num(table.duplicates)
            ),
        }
    }
    if table.missing_key > 0 {
        log::warn!(
            "{}: {} rows without a county code dropped",
            path.display(),
            table.missing_key
        );
    }
    log::info!(
        "Social capital: {} counties from {}",
        fmt_num(table.len()),
        path.display()
    );

    Ok(table)
}

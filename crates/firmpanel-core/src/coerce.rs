//! Non-strict field coercion
//!
//! Every cast returns `Result<T, CoercionFailure>`; readers fold the result
//! into `Option<T>` and count the failures. A failure never aborts a read.

/// A single field that could not be cast to its target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    pub raw: String,
    pub target: &'static str,
}

impl std::fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot coerce {:?} to {}", self.raw, self.target)
    }
}

impl std::error::Error for CoercionFailure {}

/// Width of a county FIPS code (2-digit state + 3-digit county).
pub const FIPS_WIDTH: usize = 5;

/// Trimmed, non-empty text or `None`.
pub fn text(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Integer, also accepting integral decimals such as `1995.0`.
pub fn to_i32(raw: &str) -> Result<i32, CoercionFailure> {
    let s = raw.trim();
    s.parse::<i32>()
        .ok()
        .or_else(|| {
            let v = s.parse::<f64>().ok()?;
            let in_range = v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX);
            (v.is_finite() && v.fract() == 0.0 && in_range).then_some(v as i32)
        })
        .ok_or_else(|| CoercionFailure {
            raw: raw.to_string(),
            target: "i32",
        })
}

pub fn to_f64(raw: &str) -> Result<f64, CoercionFailure> {
    raw.trim().parse().map_err(|_| CoercionFailure {
        raw: raw.to_string(),
        target: "f64",
    })
}

/// Left-pad a county code with zeros to [`FIPS_WIDTH`].
///
/// Wider codes are returned unchanged.
pub fn zero_pad_fips(code: &str) -> String {
    format!("{code:0>width$}", width = FIPS_WIDTH)
}

/// Counts of coerced-to-null fields for one read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoercionStats {
    pub failures: usize,
}

impl CoercionStats {
    /// Fold a coercion result into an optional value, counting failures.
    ///
    /// Empty or missing input is null without counting as a failure.
    pub fn fold<T>(
        &mut self,
        raw: Option<&str>,
        cast: impl Fn(&str) -> Result<T, CoercionFailure>,
    ) -> Option<T> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        match cast(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                log::trace!("{e}");
                self.failures += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pad_short_code() {
        assert_eq!(zero_pad_fips("6"), "00006");
        assert_eq!(zero_pad_fips("6037"), "06037");
    }

    #[test]
    fn zero_pad_full_width_unchanged() {
        assert_eq!(zero_pad_fips("06037"), "06037");
        assert_eq!(zero_pad_fips("123456"), "123456");
    }

    #[test]
    fn to_i32_ok_and_err() {
        assert_eq!(to_i32(" 42 "), Ok(42));
        let err = to_i32("N/A").unwrap_err();
        assert_eq!(err.raw, "N/A");
        assert_eq!(err.target, "i32");
    }

    #[test]
    fn to_i32_accepts_integral_decimal() {
        assert_eq!(to_i32("1995.0"), Ok(1995));
        assert_eq!(to_i32(" -3.00 "), Ok(-3));
        assert!(to_i32("1995.5").is_err());
        assert!(to_i32("1e12").is_err());
        assert!(to_i32("NaN").is_err());
    }

    #[test]
    fn to_f64_parses() {
        assert_eq!(to_f64("1250.5"), Ok(1250.5));
        assert!(to_f64("abc").is_err());
    }

    #[test]
    fn text_trims_and_nulls_empty() {
        assert_eq!(text(Some("  A100 ")), Some("A100".to_string()));
        assert_eq!(text(Some("   ")), None);
        assert_eq!(text(None), None);
    }

    #[test]
    fn fold_counts_failures_only() {
        let mut stats = CoercionStats::default();
        assert_eq!(stats.fold(Some("12"), to_i32), Some(12));
        assert_eq!(stats.fold(Some(""), to_i32), None);
        assert_eq!(stats.fold(None, to_i32), None);
        assert_eq!(stats.fold(Some("N/A"), to_i32), None);
        assert_eq!(stats.failures, 1);
    }
}

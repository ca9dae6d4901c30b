//! HiPS property-file date parsing.

use chrono::NaiveDate;

/// Parse a date in the format used by HiPS property files
/// (`2019-01-02T15:27Z`, optionally with seconds) into MJD days.
///
/// Returns 0.0 on any parse failure, meaning "unknown release date; no
/// cache-busting".
pub fn parse_hips_date(s: &str) -> f64 {
    let s = s.trim();
    let parsed = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%MZ")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"));
    let Ok(datetime) = parsed else {
        return 0.0;
    };
    // MJD epoch: 1858-11-17T00:00:00 UTC.
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17)
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    let Some(epoch) = epoch else {
        return 0.0;
    };
    let delta = datetime - epoch;
    delta.num_seconds() as f64 / 86_400.0
}

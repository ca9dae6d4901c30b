//! HiPS-list file parsing.
//!
//! A HiPS list is a line-oriented `key = value` document where blank lines
//! separate survey records. Only the service URL and the release date are
//! of interest here; everything else is skipped.

use crate::survey::date::parse_hips_date;

/// One survey record from a HiPS list.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyListEntry {
    /// Value of `hips_service_url`.
    pub service_url: String,
    /// Release date in MJD days, 0.0 when absent or unparseable.
    pub release_date: f64,
}

/// Parse a HiPS-list document.
///
/// A record is emitted when a blank line or the end of input follows
/// lines that carried a `hips_service_url`. Comment lines start with `#`.
pub fn parse_hipslist(data: &str) -> Vec<SurveyListEntry> {
    let mut entries = Vec::new();
    let mut service_url: Option<String> = None;
    let mut release_date = 0.0;

    let mut flush = |url: &mut Option<String>, date: &mut f64| {
        if let Some(service_url) = url.take() {
            entries.push(SurveyListEntry {
                service_url,
                release_date: *date,
            });
        }
        *date = 0.0;
    };

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut service_url, &mut release_date);
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or_default().trim();
        let value = parts.next().unwrap_or_default().trim();
        match key {
            "hips_service_url" => service_url = Some(value.to_string()),
            "hips_release_date" => release_date = parse_hips_date(value),
            _ => {}
        }
    }
    flush(&mut service_url, &mut release_date);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_records() {
        let data = "\
# a comment
hips_service_url = https://example.org/a
hips_release_date = 2019-01-02T15:27Z

hips_service_url=https://example.org/b
";
        let entries = parse_hipslist(data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].service_url, "https://example.org/a");
        assert!((entries[0].release_date - 58485.64375).abs() < 1e-9);
        assert_eq!(entries[1].service_url, "https://example.org/b");
        assert_eq!(entries[1].release_date, 0.0);
    }

    #[test]
    fn test_record_without_url_is_skipped() {
        let data = "hips_release_date = 2019-01-02T15:27Z\n\nhips_service_url = u\n";
        let entries = parse_hipslist(data);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service_url, "u");
        // The dangling release date does not leak into the next record.
        assert_eq!(entries[0].release_date, 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_hipslist("").is_empty());
    }

    #[test]
    fn test_multiple_blank_lines_between_records() {
        let data = "hips_service_url = a\n\n\n\nhips_service_url = b\n";
        let entries = parse_hipslist(data);
        assert_eq!(entries.len(), 2);
    }
}

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

const TIMESTAMP_LEN: usize = 14;
const EXTENSION: &str = ".jpg";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One person who said the consent phrase on stream. The embedding is the
/// face captured at grant time; identity matching compares live faces
/// against it.
#[derive(Clone, Debug)]
pub struct ConsentRecord {
    pub name: String,
    pub embedding: Vec<f32>,
    pub granted_at: NaiveDateTime,
    /// The capture file this record was loaded from. Deleting that file
    /// revokes the consent.
    pub source: PathBuf,
}

/// Lowercases and restricts a spoken name to alphanumerics and single
/// underscores so it can live in a filename. Empty or unusable input
/// becomes "unknown".
pub fn sanitize_name(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let collapsed = lowered
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if collapsed.is_empty() {
        "unknown".to_string()
    } else {
        collapsed
    }
}

/// Builds the capture filename: 14-digit timestamp, underscore, sanitized
/// name, `.jpg`.
pub fn consent_filename(name: &str, granted_at: NaiveDateTime) -> String {
    format!(
        "{}_{}{EXTENSION}",
        granted_at.format(TIMESTAMP_FORMAT),
        sanitize_name(name)
    )
}

/// Parses a capture filename back into its grant time and name. Returns
/// `None` for anything that does not follow the convention, so stray files
/// in the consent directory are ignored rather than rejected loudly.
pub fn parse_consent_filename(filename: &str) -> Option<(NaiveDateTime, String)> {
    let stem = filename.strip_suffix(EXTENSION)?;
    if stem.len() < TIMESTAMP_LEN + 2 {
        return None;
    }
    let (timestamp_str, rest) = stem.split_at(TIMESTAMP_LEN);
    let name = rest.strip_prefix('_')?;
    if name.is_empty() || !timestamp_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let granted_at = NaiveDateTime::parse_from_str(timestamp_str, TIMESTAMP_FORMAT).ok()?;
    Some((granted_at, name.to_lowercase()))
}

/// Name and grant time from a capture path, or `None` if the file name
/// does not follow the convention.
pub fn parse_consent_path(path: &Path) -> Option<(NaiveDateTime, String)> {
    parse_consent_filename(path.file_name()?.to_str()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[rstest]
    #[case::spaces("Alice Smith", "alice_smith")]
    #[case::surrounding_whitespace("  Bob  ", "bob")]
    #[case::apostrophe("O'Brien", "o_brien")]
    #[case::repeated_underscores("a___b", "a_b")]
    #[case::leading_trailing_underscores("_alice_", "alice")]
    #[case::empty("", "unknown")]
    #[case::symbols_only("!!!", "unknown")]
    fn test_sanitize_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(raw), expected);
    }

    #[test]
    fn test_filename_round_trip() {
        let filename = consent_filename("Alice Smith", ts());
        assert_eq!(filename, "20250314092653_alice_smith.jpg");
        let (granted_at, name) = parse_consent_filename(&filename).unwrap();
        assert_eq!(granted_at, ts());
        assert_eq!(name, "alice_smith");
    }

    #[rstest]
    #[case::wrong_extension("notes.txt")]
    #[case::empty_name("20250314092653_.jpg")]
    #[case::non_digit_timestamp("2025031409265x_alice.jpg")]
    #[case::no_timestamp("alice.jpg")]
    fn test_parse_rejects_malformed_names(#[case] filename: &str) {
        assert!(parse_consent_filename(filename).is_none());
    }

    #[test]
    fn test_parse_path_uses_file_name_only() {
        let path = Path::new("/tmp/captures/20250314092653_bob.jpg");
        let (_, name) = parse_consent_path(path).unwrap();
        assert_eq!(name, "bob");
    }
}

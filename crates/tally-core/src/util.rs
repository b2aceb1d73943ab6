//! Shared utility functions used across multiple modules.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render Unix milliseconds as RFC 3339 UTC with millisecond precision.
pub fn format_millis_rfc3339(millis: i64) -> Result<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|value| value.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {millis}")))
}

/// Parse an RFC 3339 timestamp into Unix milliseconds.
pub fn parse_rfc3339_millis(raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.timestamp_millis())
        .map_err(|error| Error::InvalidInput(format!("invalid timestamp '{raw}': {error}")))
}

/// Write a file by staging it next to the target and renaming over it.
pub fn write_file_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = std::path::PathBuf::from(staging);

    {
        let mut file = std::fs::File::create(&staging)?;
        file.write_all(contents)?;
        // Flushed to disk before the rename makes it visible.
        file.sync_all()?;
    }
    std::fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn rfc3339_millis_roundtrip_keeps_precision() {
        let rendered = format_millis_rfc3339(1_700_000_000_123).unwrap();
        assert_eq!(rendered, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_rfc3339_millis(&rendered).unwrap(), 1_700_000_000_123);
    }

    #[test]
    fn parse_rfc3339_millis_accepts_offsets() {
        assert_eq!(
            parse_rfc3339_millis("2024-01-01T05:30:00+05:30").unwrap(),
            parse_rfc3339_millis("2024-01-01T00:00:00Z").unwrap()
        );
        assert!(parse_rfc3339_millis("yesterday").is_err());
    }

    #[test]
    fn write_file_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_file_atomically(&path, b"first").unwrap();
        write_file_atomically(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn atomic_write_replaces_stale_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file-hashes.json");
        std::fs::write(dir.path().join("file-hashes.json.tmp"), b"torn").unwrap();

        write_file_atomically(&path, b"{}\n").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{}\n");
        assert!(!dir.path().join("file-hashes.json.tmp").exists());
    }
}

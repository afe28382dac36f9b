//! Netscape cookie file import.
//!
//! Parses the Netscape HTTP cookie file format (7 TAB-separated fields per line)
//! into [`Cookie`] values that can be handed to [`CookieBridge::set_all`].
//!
//! [`CookieBridge::set_all`]: super::CookieBridge::set_all

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, instrument, warn};

use super::bridge::Cookie;

/// Errors that can occur while parsing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// The offending line content (value redacted).
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Parsed cookies plus warnings about skipped lines.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed cookies.
    pub cookies: Vec<Cookie>,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape-format cookie file from a buffered reader.
///
/// Each non-comment, non-blank line must contain exactly 7 TAB-separated fields:
/// `domain`, `tailmatch`, `path`, `secure`, `expires`, `name`, `value`. Lines
/// starting with `#` (except the `#HttpOnly_` prefix) and blank lines are skipped.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or [`CookieError::NoCookiesFound`]
/// when a non-empty file yields zero valid cookies. Individual malformed lines are
/// collected as warnings.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    let mut non_blank_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.starts_with('#') {
            continue;
        }

        non_blank_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(line = line_number, domain = %cookie.domain, name = %cookie.name, "parsed cookie");
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() && non_blank_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(ParseResult { cookies, warnings })
}

/// Reads and parses a cookie file from disk.
///
/// # Errors
///
/// As [`parse_netscape_cookies`], plus [`CookieError::Io`] when the file cannot be opened.
pub fn load_cookie_file(path: &Path) -> Result<ParseResult, CookieError> {
    let file = File::open(path)?;
    parse_netscape_cookies(BufReader::new(file))
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<Cookie, CookieError> {
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    }

    let domain = fields[0];
    let tailmatch = parse_bool_field(fields[1]).ok_or_else(|| {
        invalid(format!("tailmatch field must be TRUE or FALSE, got '{}'", fields[1]))
    })?;
    let path = fields[2];
    let secure = parse_bool_field(fields[3]).ok_or_else(|| {
        invalid(format!("secure field must be TRUE or FALSE, got '{}'", fields[3]))
    })?;
    let expires = fields[4].parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        ))
    })?;
    let name = fields[5];

    if domain.is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if name.is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    Ok(Cookie::new(domain, path, name, fields[6])
        .with_host_only(!tailmatch)
        .with_secure(secure)
        .with_expires((expires > 0).then_some(expires)))
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Redacts the cookie value (7th field) from a line for safe error messages.
fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else {
        line.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(s: &str) -> Cursor<&[u8]> {
        Cursor::new(s.as_bytes())
    }

    #[test]
    fn test_parse_netscape_cookies_valid_file() {
        let input = "\
# Netscape HTTP Cookie File
.tumblr.com\tTRUE\t/\tFALSE\t0\tpfg\tabc123
www.tumblr.com\tFALSE\t/svc\tTRUE\t1700000000\ttoken\txyz789
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert!(result.warnings.is_empty());

        let first = &result.cookies[0];
        assert_eq!(first.domain, "tumblr.com");
        assert!(!first.host_only);
        assert_eq!(first.expires, None);
        assert_eq!(first.value(), "abc123");

        let second = &result.cookies[1];
        assert!(second.host_only);
        assert!(second.secure);
        assert_eq!(second.path, "/svc");
        assert_eq!(second.expires, Some(1_700_000_000));
    }

    #[test]
    fn test_http_only_prefix_is_not_a_comment() {
        let input = "#HttpOnly_.tumblr.com\tTRUE\t/\tTRUE\t0\tsid\tv\n";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].name, "sid");
    }

    #[test]
    fn test_malformed_lines_become_warnings() {
        let input = "\
.good.com\tTRUE\t/\tFALSE\t0\tname\tvalue
bad line without tabs
.also-good.com\tMAYBE\t/\tFALSE\t0\tother\tval
";
        let result = parse_netscape_cookies(cursor(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].0, 2);
        assert!(result.warnings[1].1.contains("tailmatch"));
    }

    #[test]
    fn test_all_malformed_returns_error() {
        let input = "garbage\nmore garbage\n";
        assert!(matches!(
            parse_netscape_cookies(cursor(input)),
            Err(CookieError::NoCookiesFound { malformed_count: 2 })
        ));
    }

    #[test]
    fn test_empty_file_is_ok() {
        let result = parse_netscape_cookies(cursor("")).unwrap();
        assert!(result.cookies.is_empty());
    }

    #[test]
    fn test_error_message_redacts_value() {
        let line = ".x.com\tTRUE\t/\tFALSE\tsoon\tname\tsecretvalue";
        let err = parse_netscape_cookies(cursor(line)).unwrap_err();
        assert!(!err.to_string().contains("secretvalue"));
    }

    #[test]
    fn test_load_cookie_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, ".tumblr.com\tTRUE\t/\tFALSE\t0\tpfg\tv\r\n").unwrap();
        let result = load_cookie_file(&path).unwrap();
        assert_eq!(result.cookies[0].value(), "v");
    }
}

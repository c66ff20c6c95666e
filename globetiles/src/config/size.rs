//! Human-readable byte sizes ("512MB", "4GB").

use std::fmt;
use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}', expected a whole number with an optional KB, MB, GB or TB suffix")]
pub struct SizeParseError {
    input: String,
}

const KB: usize = 1024;
const MB: usize = KB * 1024;
const GB: usize = MB * 1024;
const TB: usize = GB * 1024;

/// Suffixes longest first so "MB" is tried before "B".
const UNITS: [(&str, usize); 9] = [
    ("TB", TB),
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("T", TB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Parse a size into bytes. Suffixes are binary multiples and case
/// insensitive; a bare number is bytes.
///
/// ```
/// use globetiles::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("512 mb").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(text: &str) -> Result<usize, SizeParseError> {
    let err = || SizeParseError {
        input: text.to_string(),
    };
    let upper = text.trim().to_ascii_uppercase();
    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, m)| upper.strip_suffix(suffix).map(|rest| (rest.trim_end(), *m)))
        .unwrap_or((upper.as_str(), 1));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(err)
}

/// Format bytes with the largest unit that divides them exactly.
///
/// ```
/// use globetiles::config::format_size;
///
/// assert_eq!(format_size(256 * 1024 * 1024), "256MB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: usize) -> String {
    for (suffix, unit) in [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

/// Byte count that parses from and displays as a human-readable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Size(pub usize);

impl Size {
    pub fn bytes(self) -> usize {
        self.0
    }

    pub fn from_mb(mb: usize) -> Self {
        Self(mb * MB)
    }

    pub fn from_gb(gb: usize) -> Self {
        Self(gb * GB)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl std::str::FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("10B").unwrap(), 10);
        assert_eq!(parse_size("3k").unwrap(), 3 * KB);
        assert_eq!(parse_size("256MB").unwrap(), 256 * MB);
        assert_eq!(parse_size(" 4 GB ").unwrap(), 4 * GB);
        assert_eq!(parse_size("1tb").unwrap(), TB);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "GB", "abc", "-1MB", "1.5GB", "12PB", "1 2MB"] {
            assert!(parse_size(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size("99999999999999999999TB").is_err());
    }

    #[test]
    fn test_format_picks_exact_unit() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(1536 * KB), "1536KB");
        assert_eq!(format_size(4 * GB), "4GB");
        assert_eq!(format_size(2 * TB), "2TB");
    }

    #[test]
    fn test_size_display_and_parse_agree() {
        let size: Size = "512MB".parse().unwrap();
        assert_eq!(size, Size::from_mb(512));
        assert_eq!(size.to_string(), "512MB");
        assert_eq!(Size::from_gb(1).bytes(), GB);
    }
}

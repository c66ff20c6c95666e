//! Expiration time from HTTP caching headers.
//!
//! `Cache-Control: max-age` wins. Otherwise `Expires` is used relative to the
//! server's `Date`, so clock skew between client and server cancels out.

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Compute when a response expires.
///
/// Header names must be lowercase. Returns `None` when the response carries
/// no usable caching information.
pub fn compute_expiration(headers: &HashMap<String, String>, now: SystemTime) -> Option<SystemTime> {
    if let Some(max_age) = headers.get("cache-control").and_then(|v| parse_max_age(v)) {
        return Some(now + Duration::from_secs(max_age));
    }

    let expires = headers.get("expires").and_then(|v| parse_http_date(v))?;
    match headers.get("date").and_then(|v| parse_http_date(v)) {
        Some(date) => {
            let lifetime = expires.signed_duration_since(date);
            Some(match lifetime.to_std() {
                Ok(d) => now + d,
                // Already expired according to the server
                Err(_) => now,
            })
        }
        None => Some(SystemTime::from(expires)),
    }
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

fn parse_http_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_max_age_takes_priority() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let h = headers(&[
            ("cache-control", "public, max-age=3600"),
            ("expires", "Thu, 01 Jan 2037 00:00:00 GMT"),
        ]);
        assert_eq!(
            compute_expiration(&h, now),
            Some(now + Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_expires_adjusted_by_date_skew() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(5_000_000);
        let h = headers(&[
            ("date", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ("expires", "Sun, 06 Nov 1994 09:49:37 GMT"),
        ]);
        // One hour of server-side lifetime, applied to the local clock.
        assert_eq!(
            compute_expiration(&h, now),
            Some(now + Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_expires_without_date_is_absolute() {
        let now = SystemTime::now();
        let h = headers(&[("expires", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(compute_expiration(&h, now), Some(expected));
    }

    #[test]
    fn test_expires_before_date_means_expired_now() {
        let now = SystemTime::now();
        let h = headers(&[
            ("date", "Sun, 06 Nov 1994 09:49:37 GMT"),
            ("expires", "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]);
        assert_eq!(compute_expiration(&h, now), Some(now));
    }

    #[test]
    fn test_no_caching_headers() {
        let h = headers(&[("cache-control", "no-cache"), ("content-type", "image/png")]);
        assert_eq!(compute_expiration(&h, SystemTime::now()), None);
    }

    #[test]
    fn test_unparseable_expires_ignored() {
        let h = headers(&[("expires", "0")]);
        assert_eq!(compute_expiration(&h, SystemTime::now()), None);
    }
}

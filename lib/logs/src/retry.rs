//! Reconnect backoff and server retry hints.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

/// Base reconnect delay in milliseconds.
pub const BASE_DELAY_MS: u64 = 2_000;

/// Reconnect delay ceiling in milliseconds.
pub const MAX_DELAY_MS: u64 = 15_000;

/// Delay before reconnect attempt `attempt` (1-based): base doubled per
/// prior attempt, capped at [`MAX_DELAY_MS`].
#[must_use]
pub fn backoff_delay_ms(attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    BASE_DELAY_MS
        .saturating_mul(1u64 << exponent)
        .min(MAX_DELAY_MS)
}

/// Reads the server's retry hint from response headers.
///
/// `retry-after-ms` wins when present; `retry-after` accepts delta seconds
/// or an HTTP-date. Dates already in the past clamp to zero.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    if let Some(ms) = headers
        .get("retry-after-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(ms);
    }

    let value = headers.get("retry-after")?.to_str().ok()?.trim().to_string();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let date = DateTime::parse_from_rfc2822(&value).ok()?;
    let delta_ms = date.with_timezone(&Utc).signed_duration_since(now).num_milliseconds();
    Some(delta_ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn backoff_doubles_and_caps_at_fifteen_seconds() {
        assert_eq!(backoff_delay_ms(1), 2_000);
        assert_eq!(backoff_delay_ms(2), 4_000);
        assert_eq!(backoff_delay_ms(3), 8_000);
        assert_eq!(backoff_delay_ms(4), 15_000);
        assert_eq!(backoff_delay_ms(10), 15_000);
    }

    #[test]
    fn millisecond_header_wins() {
        let map = headers(&[("retry-after-ms", "5000"), ("retry-after", "30")]);
        assert_eq!(parse_retry_after(&map, Utc::now()), Some(5_000));
    }

    #[test]
    fn delta_seconds_convert_to_milliseconds() {
        let map = headers(&[("retry-after", "7")]);
        assert_eq!(parse_retry_after(&map, Utc::now()), Some(7_000));
    }

    #[test]
    fn http_date_converts_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let map = headers(&[("retry-after", "Sun, 30 Aug 2026 12:00:10 GMT")]);
        assert_eq!(parse_retry_after(&map, now), Some(10_000));
    }

    #[test]
    fn past_http_date_clamps_to_zero() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let map = headers(&[("retry-after", "Sun, 30 Aug 2026 11:59:00 GMT")]);
        assert_eq!(parse_retry_after(&map, now), Some(0));
    }

    #[test]
    fn absent_headers_yield_none() {
        assert_eq!(parse_retry_after(&HeaderMap::new(), Utc::now()), None);
    }
}

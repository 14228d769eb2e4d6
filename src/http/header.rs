//! The `X-Client-Timeout-Ms` propagation header.
//!
//! A non-negative decimal integer of milliseconds: the budget the caller is
//! still willing to wait. Absent means the caller set no budget.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_CLIENT_TIMEOUT_MS: HeaderName = HeaderName::from_static("x-client-timeout-ms");

/// Read the propagated budget. Malformed values are treated as absent.
pub fn parse_timeout(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(&X_CLIENT_TIMEOUT_MS)?;
    match value.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(ms) => Some(ms),
        None => {
            tracing::debug!(value = ?value, "Ignoring malformed X-Client-Timeout-Ms");
            None
        }
    }
}

pub fn timeout_value(ms: u64) -> HeaderValue {
    HeaderValue::from(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_CLIENT_TIMEOUT_MS, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_timeout(&headers("1500")), Some(1500));
        assert_eq!(parse_timeout(&headers("0")), Some(0));
        assert_eq!(parse_timeout(&headers(" 42 ")), Some(42));
    }

    #[test]
    fn missing_header_is_none() {
        assert_eq!(parse_timeout(&HeaderMap::new()), None);
    }

    #[test]
    fn malformed_values_are_ignored() {
        assert_eq!(parse_timeout(&headers("-5")), None);
        assert_eq!(parse_timeout(&headers("1.5")), None);
        assert_eq!(parse_timeout(&headers("soon")), None);
        assert_eq!(parse_timeout(&headers("")), None);
    }

    #[test]
    fn formats_as_decimal() {
        assert_eq!(timeout_value(250), HeaderValue::from_static("250"));
    }
}

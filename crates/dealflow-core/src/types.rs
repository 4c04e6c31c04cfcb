use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A JSON object used for entity fields, step values, and where-predicates.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Timestamp
// =============================================================================

/// Unix timestamp in seconds, the canonical time representation for stored
/// records and plan metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }
}

// =============================================================================
// Date parsing
// =============================================================================

/// Parse a user-facing date/time value in one of the accepted formats.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM`, and bare `YYYY-MM-DD` (midnight).
/// Returns `None` for anything else; callers treat that as a missing date.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Timestamp ----

    #[test]
    fn test_timestamp_now_is_recent() {
        let ts = Timestamp::now();
        let now = Utc::now().timestamp();
        assert!((now - ts.0).abs() < 5);
    }

    #[test]
    fn test_timestamp_datetime_round_trip() {
        let dt = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.0, 1_700_000_000);
        assert_eq!(ts.to_datetime(), dt);
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp(100) < Timestamp(200));
        assert_eq!(Timestamp(300), Timestamp(300));
    }

    #[test]
    fn test_timestamp_serde_round_trip() {
        let ts = Timestamp(1_700_000_000);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1700000000");
        let rt: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, rt);
    }

    // ---- parse_datetime ----

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_datetime("2026-03-01T14:30:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1772375400);
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_datetime("2026-03-01T14:30:00+09:00").unwrap();
        let utc = parse_datetime("2026-03-01T05:30:00Z").unwrap();
        assert_eq!(dt, utc);
    }

    #[test]
    fn test_parse_date_time_minutes() {
        let dt = parse_datetime("2026-03-01 14:30").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "14:30");
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let dt = parse_datetime("2026-03-01").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datetime("next tuesday").is_none());
        assert!(parse_datetime("").is_none());
        assert!(parse_datetime("2026-13-45").is_none());
        assert!(parse_datetime("14:30").is_none());
    }
}

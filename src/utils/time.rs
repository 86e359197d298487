/// Timestamp helpers.
///
/// Every timestamp the server hands out (subscription times, change events,
/// notifications) is an RFC 3339 UTC string produced by `now_utc()`.
use chrono::{DateTime, Utc};

/// Current UTC time in RFC 3339 format, e.g. "2025-12-17T02:30:00Z".
pub fn now_utc() -> String {
    format_utc(Utc::now())
}

/// Format a UTC datetime the same way `now_utc()` does.
pub(crate) fn format_utc(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_utc() {
        let timestamp = now_utc();
        assert!(timestamp.ends_with('Z'), "UTC timestamp should end with Z");
        assert!(DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }

    #[test]
    fn test_format_utc_truncates_to_seconds() {
        let dt = Utc.with_ymd_and_hms(2025, 12, 17, 2, 30, 0).unwrap();
        assert_eq!(format_utc(dt), "2025-12-17T02:30:00Z");
    }
}

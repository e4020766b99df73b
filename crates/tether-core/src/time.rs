//! Wall-clock helpers.

use chrono::{SecondsFormat, Utc};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time as ISO-8601 with millisecond precision and a `Z`
/// suffix, e.g. `2026-10-18T09:14:03.512Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_are_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }

    #[test]
    fn iso_has_millis_and_zulu() {
        let s = now_iso();
        assert!(s.ends_with('Z'), "{s}");
        assert_eq!(s.len(), "2026-10-18T09:14:03.512Z".len());
        assert!(chrono::DateTime::parse_from_rfc3339(&s).is_ok());
    }
}

pub mod category;
pub mod chat;
pub mod document;

pub use category::*;
pub use chat::*;
pub use document::*;

use chrono::NaiveDateTime;

use super::sqlite::DATETIME_FORMAT;

/// Format a datetime the way every table stores it.
pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a stored datetime, tolerating rows written without fractional seconds.
pub(crate) fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trip_preserves_microseconds() {
        let now = chrono::Local::now().naive_local();
        let parsed = parse_datetime(&format_datetime(&now));
        let delta = (now - parsed).num_microseconds().unwrap_or(i64::MAX).abs();
        assert!(delta < 1000, "lost more than a millisecond: {delta}us");
    }

    #[test]
    fn parses_whole_second_timestamps() {
        let parsed = parse_datetime("2026-08-29 10:30:00");
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "10:30:00");
    }
}

use chrono::{TimeZone, Utc};

/// Current wall-clock time as unix milliseconds, the unit every timestamp
/// column in the summaries schema uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render a unix-millis timestamp as RFC 3339 in UTC.
/// Out-of-range values are rendered as the raw number.
pub fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_and_known_instant() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_millis(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn out_of_range_falls_back_to_number() {
        assert_eq!(format_millis(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn now_is_after_2024() {
        assert!(now_millis() > 1_704_067_200_000);
    }
}

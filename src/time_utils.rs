// SPDX-License-Identifier: MIT

//! Shared helpers for date/time formatting.
//!
//! Audit notes carry timestamps in Moscow time with a fixed `dd.mm.yyyy
//! HH:MM:SS` layout. The exact rendering is an external contract: the notes
//! are read by humans inside the CRM and asserted on by tests.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::Value;

/// Europe/Moscow is a fixed UTC+3 offset (no DST since 2014).
const MSK_OFFSET_SECS: i32 = 3 * 3600;

/// Format a UTC timestamp for audit notes: Moscow time, `dd.mm.yyyy HH:MM:SS`.
pub fn format_msk(date: DateTime<Utc>) -> String {
    let msk = FixedOffset::east_opt(MSK_OFFSET_SECS).unwrap();
    date.with_timezone(&msk).format("%d.%m.%Y %H:%M:%S").to_string()
}

/// Parse an entity `created_at` field.
///
/// amoCRM delivers epoch seconds in JSON webhooks but numeric strings in
/// form-encoded ones, and ISO-8601 strings through some API responses. All
/// three are accepted; anything else is `None`.
pub fn parse_created_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => {
            if let Ok(secs) = s.trim().parse::<i64>() {
                return Utc.timestamp_opt(secs, 0).single();
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_msk_is_fixed_offset() {
        // 2024-05-06 12:30:00 UTC == 15:30:00 MSK
        let dt = Utc.with_ymd_and_hms(2024, 5, 6, 12, 30, 0).unwrap();
        assert_eq!(format_msk(dt), "06.05.2024 15:30:00");
    }

    #[test]
    fn test_parse_created_at_epoch_number() {
        let dt = parse_created_at(&json!(1715000000)).unwrap();
        assert_eq!(dt.timestamp(), 1715000000);
    }

    #[test]
    fn test_parse_created_at_numeric_string() {
        let dt = parse_created_at(&json!("1715000000")).unwrap();
        assert_eq!(dt.timestamp(), 1715000000);
    }

    #[test]
    fn test_parse_created_at_iso_string() {
        let dt = parse_created_at(&json!("2024-05-06T12:30:00+03:00")).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_created_at_garbage() {
        assert!(parse_created_at(&json!("soon")).is_none());
        assert!(parse_created_at(&json!([1, 2])).is_none());
    }
}

//! Parsing and formatting of the clock-style durations and loose timestamps
//! found in imported spreadsheets and legacy documents.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Format as `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Compact `1h 05m` style label used in tables.
pub fn format_short(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m {:02}s", total % 60)
    }
}

/// Parse `HH:MM:SS` or `HH:MM`. Empty input is zero.
pub fn parse_hms(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(Duration::ZERO);
    }
    let parts = trimmed
        .split(':')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let secs = match parts.as_slice() {
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            hours * 3600 + minutes * 60 + seconds
        }
        [hours, minutes] if *minutes < 60 => hours * 3600 + minutes * 60,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Parse `YYYY-MM-DD`, also accepting a trailing time component.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Parse an RFC 3339 timestamp, or a naive timestamp/date interpreted in the
/// local time zone.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_in(value, &Local)
}

/// Like [`parse_timestamp`] with an explicit zone for naive values.
pub fn parse_timestamp_in<Tz: TimeZone>(value: &str, zone: &Tz) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Convert an Excel serial day number (1900 date system) to a timestamp.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_round_trips_long_durations() {
        let duration = Duration::from_secs(125 * 3600 + 7 * 60 + 9);
        assert_eq!(format_hms(duration), "125:07:09");
        assert_eq!(parse_hms("125:07:09"), Some(duration));
        assert_eq!(parse_hms("02:30"), Some(Duration::from_secs(9000)));
        assert_eq!(parse_hms(""), Some(Duration::ZERO));
        assert_eq!(parse_hms("1:75:00"), None);
        assert_eq!(parse_hms("soon"), None);
    }

    #[test]
    fn short_format_switches_on_hours() {
        assert_eq!(format_short(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_short(Duration::from_secs(3900)), "1h 05m");
    }

    #[test]
    fn naive_timestamps_use_supplied_zone() {
        let parsed = parse_timestamp_in("2024-02-03T10:20:30.250000", &Utc).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-02-03T10:20:30.250+00:00");
        let spaced = parse_timestamp_in("2024-02-03 10:20:30", &Utc).unwrap();
        assert_eq!(spaced.timestamp(), parsed.timestamp());
        let date_only = parse_timestamp_in("2024-02-03", &Utc).unwrap();
        assert_eq!(date_only.to_rfc3339(), "2024-02-03T00:00:00+00:00");
        let zoned = parse_timestamp_in("2024-02-03T10:20:30+02:00", &Utc).unwrap();
        assert_eq!(zoned.to_rfc3339(), "2024-02-03T08:20:30+00:00");
        assert!(parse_timestamp_in("yesterday", &Utc).is_none());
    }

    #[test]
    fn excel_serials_map_to_dates() {
        let parsed = from_excel_serial(45292.5).unwrap();
        assert_eq!(parsed.to_string(), "2024-01-01 12:00:00");
        assert!(from_excel_serial(0.0).is_none());
        assert_eq!(parse_date("2023-11-02 08:00:00"), NaiveDate::from_ymd_opt(2023, 11, 2));
    }
}

// Timestamp helpers
//
// Internally every derived timestamp is a local wall-clock string in
// `YYYY-MM-DD HH:MM:SS`. Conversion to UTC happens only at the mirror boundary
// and uses a fixed source offset rather than a timezone database.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// UTC-6, the lab's standard time
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -360;

const ALTERNATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

fn source_offset(offset_minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(offset_minutes.checked_mul(60)?)
}

/// Current wall-clock time at the given source offset, canonical format
pub fn now_string(offset_minutes: i32) -> String {
    let now = Utc::now();
    match source_offset(offset_minutes) {
        Some(offset) => now.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Strict check for the canonical `YYYY-MM-DD HH:MM:SS` spelling
pub fn is_canonical(raw: &str) -> bool {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).is_ok()
}

pub fn is_date_only(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).is_ok()
}

/// Parse any spelling the stores have been seen to hold.
///
/// Accepts the canonical form, ISO `T`-separated forms (with or without
/// fractional seconds), RFC 3339 with an offset (the wall-clock part is kept)
/// and bare dates, which are read as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Some(parsed);
    }

    for format in ALTERNATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }

    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Rewrite alternate spellings into the canonical form.
///
/// Bare dates stay bare and anything unparseable is returned trimmed but
/// otherwise untouched; this never fails.
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_date_only(trimmed) {
        return trimmed.to_string();
    }
    match parse_timestamp(trimmed) {
        Some(parsed) => parsed.format(TIMESTAMP_FORMAT).to_string(),
        None => trimmed.to_string(),
    }
}

/// `YYYY-MM-DD` part of a timestamp
pub fn date_only(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|parsed| parsed.format(DATE_FORMAT).to_string())
}

/// `yymmdd` compact date used in page titles
pub fn yymmdd(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|parsed| parsed.format("%y%m%d").to_string())
}

/// Convert a local timestamp to UTC ISO-8601 (`2026-02-02T14:00:00+00:00`)
pub fn to_utc_iso(raw: &str, offset_minutes: i32) -> Option<String> {
    let naive = parse_timestamp(raw)?;
    let offset = source_offset(offset_minutes)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(
        local
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%S+00:00")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_known_spellings() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();

        assert_eq!(parse_timestamp("2026-02-02 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-02-02T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-02-02T08:00:00.250"), Some(expected + chrono::Duration::milliseconds(250)));
        assert_eq!(parse_timestamp("2026-02-02T08:00:00-06:00"), Some(expected));
        assert_eq!(parse_timestamp(" 2026-02-02 08:00 "), Some(expected));
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_normalize_keeps_dates_and_garbage() {
        assert_eq!(normalize_timestamp("2026-02-02T08:00:00"), "2026-02-02 08:00:00");
        assert_eq!(normalize_timestamp("2026-02-02"), "2026-02-02");
        assert_eq!(normalize_timestamp("  "), "");
        assert_eq!(normalize_timestamp("tbd"), "tbd");
    }

    #[test]
    fn test_compact_and_date_forms() {
        assert_eq!(yymmdd("2026-02-02 08:00:00").as_deref(), Some("260202"));
        assert_eq!(date_only("2026-02-03 09:00:00").as_deref(), Some("2026-02-03"));
        assert_eq!(date_only("2026-02-03").as_deref(), Some("2026-02-03"));
        assert!(yymmdd("").is_none());
    }

    #[test]
    fn test_utc_conversion_uses_fixed_offset() {
        assert_eq!(
            to_utc_iso("2026-02-02 20:30:00", DEFAULT_UTC_OFFSET_MINUTES).as_deref(),
            Some("2026-02-03T02:30:00+00:00")
        );
        assert_eq!(
            to_utc_iso("2026-07-01 00:00:00", 0).as_deref(),
            Some("2026-07-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_now_string_is_canonical() {
        assert!(is_canonical(&now_string(DEFAULT_UTC_OFFSET_MINUTES)));
    }
}

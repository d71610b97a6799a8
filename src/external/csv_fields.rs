use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parses a calendar date from the formats found in exported price and news files.
///
/// Timestamps such as `2024-03-01 00:00:00-05:00` are truncated to their date part,
/// matching how the exporter writes one row per trading day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok())
}

/// Parses an article publication time. Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }

    parse_date(trimmed)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses a price cell. Blank, `null`, `-` and non-finite values are treated as missing.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(['$', ','], "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "-" || cleaned.eq_ignore_ascii_case("null") {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Locates a header case-insensitively, ignoring a leading byte-order mark.
pub fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date("2024-03-01"), Some(expected));
        assert_eq!(parse_date("2024-03-01 00:00:00-05:00"), Some(expected));
        assert_eq!(parse_date("03/01/2024"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_price_cleans_currency() {
        assert_eq!(parse_price("$1,234.50"), Some(1234.5));
        assert_eq!(parse_price(" 101.25 "), Some(101.25));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("null"), None);
        assert_eq!(parse_price("NaN"), None);
        assert_eq!(parse_price("-"), None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let ts = parse_timestamp("2024-03-01T14:30:00Z").unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let shifted = parse_timestamp("2024-03-01T23:30:00-05:00").unwrap();
        assert_eq!(shifted.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());

        assert!(parse_timestamp("2024-03-01 09:15:00").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("soon").is_none());
    }

    #[test]
    fn test_find_column_ignores_case_and_bom() {
        let headers = csv::StringRecord::from(vec!["\u{feff}Date", "Open", "close"]);
        assert_eq!(find_column(&headers, "date"), Some(0));
        assert_eq!(find_column(&headers, "Close"), Some(2));
        assert_eq!(find_column(&headers, "Volume"), None);
    }
}

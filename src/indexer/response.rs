//! Response parsing contract and shared field parsers

use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::http::RawResponse;
use super::types::ReleaseRecord;
use crate::error::Result;

/// Turns a raw response into releases.
///
/// Missing optional fields are not errors: counts default to zero and volume
/// factors to one. A response that shows the session is gone must return
/// [`IndexerError::SessionExpired`](crate::error::IndexerError::SessionExpired)
/// rather than an empty list.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, response: &RawResponse) -> Result<Vec<ReleaseRecord>>;
}

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Strip markup fragments and collapse whitespace
pub fn normalize_title(raw: &str) -> String {
    let text = MARKUP.replace_all(raw, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace(" - ]", "]");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse size string (e.g., "1.5 GB"), binary units
pub fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim().to_uppercase().replace(',', "");
    let split = size_str
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size_str.len());
    let (num, unit) = size_str.split_at(split);
    let num: f64 = num.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "B" | "BYTES" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((num * multiplier) as u64)
}

/// Digits of a counter cell ("1,204" -> 1204), zero when there are none
pub fn coerce_int(text: &str) -> u32 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

static TIME_AGO_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*(sec|min|hour|hr|day|week|wk|month|mo|year|yr)").expect("valid regex")
});

/// Parse a relative time ("3 hours and 5 minutes ago") against `now`.
///
/// Returns `None` for text it does not understand or for amounts that fall
/// outside the representable date range.
pub fn parse_time_ago(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim().to_lowercase();
    if text == "now" || text == "just now" {
        return Some(now);
    }
    if text == "yesterday" {
        return now.checked_sub_signed(TimeDelta::days(1));
    }

    let mut total = TimeDelta::zero();
    let mut matched = false;
    for cap in TIME_AGO_PART.captures_iter(&text) {
        let n: i64 = cap[1].parse().ok()?;
        let unit = match &cap[2] {
            "sec" => TimeDelta::try_seconds(n),
            "min" => TimeDelta::try_minutes(n),
            "hour" | "hr" => TimeDelta::try_hours(n),
            "day" => TimeDelta::try_days(n),
            "week" | "wk" => TimeDelta::try_weeks(n),
            "month" | "mo" => n.checked_mul(30).and_then(TimeDelta::try_days),
            _ => n.checked_mul(365).and_then(TimeDelta::try_days),
        }?;
        total = total.checked_add(&unit)?;
        matched = true;
    }
    if !matched {
        return None;
    }
    now.checked_sub_signed(total)
}

/// Parse an RSS `pubDate`, tolerating a few common deviations
pub fn parse_rfc822_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Artist  -  Album <span>[FLAC]</span>\n (2020) "),
            "Artist - Album [FLAC] (2020)"
        );
        assert_eq!(normalize_title("Show [2020 - ]"), "Show [2020]");
        assert_eq!(normalize_title("A &amp; B"), "A & B");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1.5 GB"), Some(1_610_612_736));
        assert_eq!(parse_size("500 MB"), Some(524_288_000));
        assert_eq!(parse_size("1 TB"), Some(1_099_511_627_776));
        assert_eq!(parse_size("1,024 KB"), Some(1_048_576));
        assert_eq!(parse_size("700MiB"), Some(734_003_200));
        assert_eq!(parse_size("n/a"), None);
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int(" 1,204 "), 1204);
        assert_eq!(coerce_int(""), 0);
        assert_eq!(coerce_int("-"), 0);
    }

    #[test]
    fn test_parse_time_ago() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            parse_time_ago("3 hours and 5 minutes ago", now),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 8, 55, 0).unwrap())
        );
        assert_eq!(
            parse_time_ago("2 days, 1 hour ago", now),
            Some(Utc.with_ymd_and_hms(2024, 3, 8, 11, 0, 0).unwrap())
        );
        assert_eq!(parse_time_ago("just now", now), Some(now));
        assert_eq!(parse_time_ago("sometime", now), None);
    }

    #[test]
    fn test_parse_time_ago_out_of_range() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(parse_time_ago("99999999999999 years ago", now), None);
        assert_eq!(parse_time_ago("9223372036854775807 weeks ago", now), None);
        assert_eq!(parse_time_ago("99999999999999999999 days ago", now), None);
        assert_eq!(parse_time_ago("300000 years, 300000 years ago", now), None);
    }

    #[test]
    fn test_parse_rfc822_date() {
        assert_eq!(
            parse_rfc822_date("Sun, 10 Mar 2024 12:00:00 +0100"),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap())
        );
        assert_eq!(
            parse_rfc822_date("2024-03-10 12:00:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap())
        );
        assert_eq!(parse_rfc822_date("garbage"), None);
    }
}

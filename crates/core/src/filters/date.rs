//! Date parsing helpers behind the `dateparse`, `fuzzytime` and `timeago`
//! filters, also used directly by response parsing for publish dates.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Formats tried, in order, when no explicit layout is given. Trackers are
/// wildly inconsistent here.
const COMMON_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y",
    "%d %b %Y %H:%M",
    "%d %b %Y",
    "%b %d %Y",
    "%b %d, %Y",
];

static TIME_AGO_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([A-Za-z]+)").expect("pattern compiles"));

/// Parse with an explicit chrono layout. Naive results are taken as UTC;
/// date-only layouts land on midnight.
pub fn parse_with_format(text: &str, format: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, format) {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("'{text}' does not match layout '{format}'"))
}

/// Parse relative phrases like "3 days ago", "1 hour 20 mins ago", "4d ago".
pub fn parse_time_ago(text: &str) -> Result<DateTime<Utc>, String> {
    let cleaned = text.trim().trim_end_matches("ago").trim();
    if cleaned.is_empty() {
        return Err(format!("'{text}' has no duration parts"));
    }
    let mut seconds = 0f64;
    let mut matched = false;
    for caps in TIME_AGO_PART.captures_iter(cleaned) {
        let value: f64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| format!("bad number in '{text}'"))?;
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        seconds += value * unit_seconds(unit).ok_or_else(|| format!("unknown unit '{unit}'"))?;
        matched = true;
    }
    if !matched {
        return Err(format!("'{text}' is not a relative time"));
    }
    Ok(Utc::now() - Duration::seconds(seconds.round() as i64))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_lowercase();
    let unit = unit.trim_end_matches('s');
    Some(match unit {
        "year" | "yr" | "y" => 365.0 * 86400.0,
        "month" | "mo" => 30.0 * 86400.0,
        "week" | "wk" | "w" => 7.0 * 86400.0,
        "day" | "d" => 86400.0,
        "hour" | "hr" | "h" => 3600.0,
        "minute" | "min" | "m" => 60.0,
        "second" | "sec" => 1.0,
        _ => return None,
    })
}

/// Best-effort parse of whatever a tracker rendered: relative phrases,
/// "today 14:30" style words, unix timestamps, RFC 3339/2822 and the common
/// layout table.
pub fn parse_fuzzy(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty date".to_string());
    }
    let lower = text.to_ascii_lowercase();

    if lower == "now" || lower == "just now" {
        return Ok(Utc::now());
    }
    if lower.ends_with("ago") {
        return parse_time_ago(text);
    }
    for (word, day_offset) in [("today", 0i64), ("yesterday", -1), ("tomorrow", 1)] {
        if let Some(rest) = lower.strip_prefix(word) {
            let date = (Utc::now() + Duration::days(day_offset)).date_naive();
            let time = parse_time_of_day(rest.trim_start_matches([' ', ',', '-', 'a', 't']));
            if let Some(naive) = date.and_time(time).and_local_timezone(Utc).single() {
                return Ok(naive);
            }
        }
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = text.parse::<i64>() {
            let parsed = match text.len() {
                13 => Utc.timestamp_millis_opt(n).single(),
                _ => Utc.timestamp_opt(n, 0).single(),
            };
            if let Some(dt) = parsed {
                return Ok(dt);
            }
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in COMMON_FORMATS {
        if let Ok(dt) = parse_with_format(text, format) {
            return Ok(dt);
        }
    }
    Err(format!("unrecognized date '{text}'"))
}

fn parse_time_of_day(text: &str) -> NaiveTime {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .unwrap_or_else(|_| NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_format() {
        let dt = parse_with_format("2024-03-01 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T14:30:00+00:00");

        let dt = parse_with_format("01.03.2024", "%d.%m.%Y").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        assert!(parse_with_format("garbage", "%Y-%m-%d").is_err());
    }

    #[test]
    fn test_parse_time_ago() {
        let dt = parse_time_ago("2 hours ago").unwrap();
        let delta = Utc::now() - dt;
        assert!((delta.num_minutes() - 120).abs() <= 1);

        let dt = parse_time_ago("1 day 6 hours ago").unwrap();
        let delta = Utc::now() - dt;
        assert!((delta.num_hours() - 30).abs() <= 1);

        let dt = parse_time_ago("45m ago").unwrap();
        let delta = Utc::now() - dt;
        assert!((delta.num_minutes() - 45).abs() <= 1);

        assert!(parse_time_ago("ago").is_err());
        assert!(parse_time_ago("5 fortnights ago").is_err());
    }

    #[test]
    fn test_parse_fuzzy_relative_words() {
        let today = parse_fuzzy("Today 14:30").unwrap();
        assert_eq!(today.date_naive(), Utc::now().date_naive());
        assert_eq!(today.format("%H:%M").to_string(), "14:30");

        let yesterday = parse_fuzzy("yesterday").unwrap();
        assert_eq!(
            yesterday.date_naive(),
            (Utc::now() - Duration::days(1)).date_naive()
        );
    }

    #[test]
    fn test_parse_fuzzy_timestamps_and_layouts() {
        assert_eq!(
            parse_fuzzy("1700000000").unwrap().timestamp(),
            1_700_000_000
        );
        assert_eq!(
            parse_fuzzy("1700000000000").unwrap().timestamp(),
            1_700_000_000
        );
        assert_eq!(
            parse_fuzzy("2023-11-14T22:13:20+00:00").unwrap().timestamp(),
            1_700_000_000
        );
        assert!(parse_fuzzy("2024-03-01 10:00:00").is_ok());
        assert!(parse_fuzzy("03/01/2024").is_ok());
        assert!(parse_fuzzy("not a date").is_err());
    }
}

//! Human-readable size parsing ("1.5 GB", "700,5 MiB", "123456789").

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([\d.,]+)\s*([KMGTPE]?I?B?)").expect("pattern compiles"));

/// Parse a tracker-rendered size into bytes.
///
/// Binary multipliers are used for both "KB" and "KiB" spellings since that
/// is how trackers almost universally mean them. A bare number is taken as
/// bytes already.
pub fn parse_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let caps = SIZE
        .captures(text)
        .ok_or_else(|| format!("'{text}' is not a size"))?;
    let number = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    // "1,234.5" uses comma as thousands separator, "1234,5" as decimal mark.
    let normalized = if number.contains('.') {
        number.replace(',', "")
    } else {
        number.replace(',', ".")
    };
    let value: f64 = normalized
        .parse()
        .map_err(|_| format!("bad number '{number}' in '{text}'"))?;

    let multiplier = match unit.to_ascii_uppercase().trim_end_matches('B').trim_end_matches('I') {
        "" => 1f64,
        "K" => 1024f64,
        "M" => 1024f64.powi(2),
        "G" => 1024f64.powi(3),
        "T" => 1024f64.powi(4),
        "P" => 1024f64.powi(5),
        "E" => 1024f64.powi(6),
        other => return Err(format!("unknown size unit '{other}' in '{text}'")),
    };
    Ok((value * multiplier).round() as u64)
}

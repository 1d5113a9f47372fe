//! Display helpers shared by the roster and dashboard views.

use chrono::{DateTime, Local, NaiveDateTime};

pub const NOT_SET: &str = "not set";
pub const UNKNOWN: &str = "unknown";

/// Avatar letter: first character of the name, uppercased ("S" when empty).
pub fn initials(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map_or_else(|| "S".to_string(), |c| c.to_uppercase().collect())
}

/// Returns the value, or "not set" for missing/blank values.
pub fn or_not_set(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(NOT_SET)
}

/// Human-readable size in base-1024 units with at most two decimals.
pub fn file_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let bytes = bytes.unwrap_or(0);
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

/// Coarse document kind derived from the file type/extension.
pub fn file_kind(file_type: Option<&str>) -> &'static str {
    let Some(kind) = file_type.map(str::to_ascii_lowercase) else {
        return "File";
    };
    let has = |needle: &str| kind.contains(needle);

    if has("pdf") {
        "PDF"
    } else if has("doc") || has("word") {
        "Word"
    } else if has("xls") || has("excel") {
        "Excel"
    } else if has("ppt") || has("powerpoint") {
        "PowerPoint"
    } else if has("image") || has("jpg") || has("jpeg") || has("png") || has("gif") {
        "Image"
    } else if has("zip") || has("rar") {
        "Archive"
    } else {
        "File"
    }
}

/// Parses portal timestamps into local wall-clock time.
///
/// Accepts RFC 3339 (converted to local time) and naive ISO 8601 values,
/// which are taken as local already.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// `YYYY-MM-DD HH:MM`, or "unknown".
pub fn date_time(value: Option<&str>) -> String {
    value
        .and_then(parse_timestamp)
        .map_or_else(|| UNKNOWN.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

/// Relative age such as "today", "3 days ago", "2 months ago".
pub fn relative_date(value: Option<&str>) -> String {
    relative_date_from(value, Local::now().naive_local())
}

pub fn relative_date_from(value: Option<&str>, now: NaiveDateTime) -> String {
    let Some(then) = value.and_then(parse_timestamp) else {
        return UNKNOWN.to_string();
    };
    let days = (now - then).num_days();

    let ago = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };
    match days {
        i64::MIN..=0 => "today".to_string(),
        1 => "yesterday".to_string(),
        2..=6 => ago(days, "day"),
        7..=29 => ago(days / 7, "week"),
        30..=364 => ago(days / 30, "month"),
        _ => ago(days / 365, "year"),
    }
}

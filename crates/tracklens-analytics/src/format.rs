//! Cell stringification.
//!
//! Every stored value reaches the grid through [`format`]; the column's
//! [`ValueKind`] picks the rendering.

use tracklens_core::{AnalyticsDateTime, ValueKind};

/// Renders a stored raw value for a grid cell.
///
/// Values that do not parse as their declared kind are passed through
/// unchanged rather than dropped.
pub fn format(kind: ValueKind, raw: &str) -> String {
    match kind {
        ValueKind::Numeric => format_number(raw),
        ValueKind::Boolean => match parse_bool(raw) {
            Some(true) => "1".to_string(),
            Some(false) => "0".to_string(),
            None => raw.to_string(),
        },
        ValueKind::TrueOnly => match parse_bool(raw) {
            Some(b) => b.to_string(),
            None => raw.to_string(),
        },
        ValueKind::Date => raw
            .parse::<AnalyticsDateTime>()
            .ok()
            .and_then(|dt| dt.to_date_string().ok())
            .unwrap_or_else(|| raw.to_string()),
        ValueKind::DateTime => raw
            .parse::<AnalyticsDateTime>()
            .map(|dt| format_datetime(&dt))
            .unwrap_or_else(|_| raw.to_string()),
        ValueKind::Text | ValueKind::Coordinate => raw.to_string(),
    }
}

/// `yyyy-MM-dd HH:mm:ss.SSS`.
pub fn format_datetime(datetime: &AnalyticsDateTime) -> String {
    datetime
        .to_grid_string()
        .unwrap_or_else(|_| datetime.to_string())
}

pub fn format_f64(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_number(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => format_f64(value),
        _ => raw.to_string(),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" => Some(true),
        "0" => Some(false),
        s if s.eq_ignore_ascii_case("true") => Some(true),
        s if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

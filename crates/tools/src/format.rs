//! Number rendering shared by the tool messages.

/// Formats `value` with at most `max_decimals` digits after the point,
/// dropping trailing zeros: `1.0 → "1"`, `6.50 → "6.5"`.
pub fn format_number(value: f64, max_decimals: usize) -> String {
    let rendered = format!("{value:.max_decimals$}");
    let trimmed = if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Money amounts: kopecks at most.
pub fn format_amount(value: f64) -> String {
    format_number(value, 2)
}

/// Fraction rendered as a percentage, e.g. `0.0658 → "6.58"`.
pub fn format_percent(fraction: f64) -> String {
    format_number(fraction * 100.0, 2)
}

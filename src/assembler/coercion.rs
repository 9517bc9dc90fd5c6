//! Lenient conversion of raw table cells into typed JSON values.
//!
//! Nothing here fails: a cell that does not parse as its destination kind is kept as
//! the original string.

use serde_json::{Number, Value};

use super::fields::FieldKind;

pub fn coerce(raw: &str, kind: FieldKind) -> Value {
    let parsed = match kind {
        FieldKind::Bool => parse_bool(raw).map(Value::Bool),
        FieldKind::List => Some(Value::Array(
            parse_list(raw).into_iter().map(Value::String).collect(),
        )),
        FieldKind::Number => parse_number(raw).map(Value::Number),
        FieldKind::Text => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Accepts `true`/`false`/`1`/`0`, any ASCII case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") || raw == "1" {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
        Some(false)
    } else {
        None
    }
}

/// JSON array syntax first, then a comma-separated fallback. Empty items are dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<Value>>(raw)
    {
        return items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Invariant-culture decimal: optional sign, digits, `.` as separator, optional exponent.
/// Grouping separators, locale commas and non-finite values are rejected.
pub fn parse_number(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b)) {
        return None;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

// Boundary coercion for string-typed numbers coming out of storage.
//
// Settings, profile fields and submitter ids are persisted as text. Everything
// that compares them goes through these helpers first so the "garbage means
// zero" rule lives in exactly one place.

use serde_json::Value;

/// Parse the leading integer of a stored value.
///
/// Leading whitespace and a single sign are accepted, then as many digits as
/// are present. Trailing junk is ignored (`"12abc"` is 12). A value with no
/// leading digit coerces to 0. Out-of-range values saturate.
pub fn coerce_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(b - b'0');
        value = value.saturating_mul(10);
        value = if negative {
            value.saturating_sub(digit)
        } else {
            value.saturating_add(digit)
        };
    }
    value
}

/// A stored flag is enabled only when it coerces to exactly 1.
pub fn coerce_flag(raw: &str) -> bool {
    coerce_int(raw) == 1
}

/// Same rule as [`coerce_int`], applied to a JSON value from a payload.
///
/// Numbers are truncated toward zero, strings are parsed, everything else is 0.
pub fn coerce_value_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => coerce_int(s),
        _ => 0,
    }
}

/// JSON truthiness: null, false, 0 and the empty string are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

//! Scalar value coercion.
//!
//! ## Responsibility
//! Normalize arbitrary client-supplied scalars into the two shapes the
//! feature layer works with: boolean-as-integer flags and floats with a
//! caller-supplied fallback. Both functions are pure and total — any input,
//! including nonsense, produces a value rather than an error.
//!
//! ## NOT Responsible For
//! - Deciding which keys are binary attributes (that belongs to `orchestrate`)
//! - Derived-feature math (that belongs to `derive`)

use serde_json::Value;

/// Tokens accepted as "true" for loosely-typed boolean input, compared
/// case-insensitively after trimming. Includes French forms because the
/// companion frontend ships localized payloads.
const TRUTHY_TOKENS: [&str; 8] = ["1", "true", "t", "yes", "y", "oui", "o", "on"];

/// Coerce an arbitrary scalar into a 0/1 flag.
///
/// - Boolean input maps directly to 0/1.
/// - Absent (`None`) or JSON `null` input is 0.
/// - Anything else is stringified, trimmed, lowercased, and compared against
///   the truthy token set; matches are 1, everything else is 0.
///
/// The mapping is stable: the same input always yields the same output.
///
/// # Panics
///
/// This function never panics.
pub fn coerce_boolean_flag(value: Option<&Value>) -> i64 {
    let Some(value) = value else { return 0 };

    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Null => 0,
        Value::String(s) => truthy(s),
        other => truthy(&other.to_string()),
    }
}

fn truthy(raw: &str) -> i64 {
    let token = raw.trim().to_lowercase();
    i64::from(TRUTHY_TOKENS.contains(&token.as_str()))
}

/// Coerce an arbitrary scalar into a float, falling back to `default` on
/// any failure.
///
/// Derivation callers pass `f64::NAN` as the default so that downstream
/// "was this present and numeric" checks can test `is_nan()`.
///
/// # Panics
///
/// This function never panics.
pub fn coerce_float(value: Option<&Value>, default: f64) -> f64 {
    let Some(value) = value else { return default };

    match value {
        Value::Number(n) => n.as_f64().unwrap_or(default),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(default),
        _ => default,
    }
}

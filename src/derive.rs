//! Derived-feature computation.
//!
//! ## Responsibility
//! Fill a fixed catalogue of derived feature names from the base property
//! attributes, matching the feature engineering the model was trained with.
//!
//! ## Guarantees
//! - Caller-supplied fields are never overwritten: a derived value is merged
//!   into the row only when its key is absent (input takes precedence)
//! - A derived field whose numeric dependencies are missing or non-numeric
//!   is left absent, never guessed — alignment fills it with the sentinel
//! - Idempotent: a second pass over the output is a no-op
//! - Order-sensitive within the pass: `area_per_room` reads `total_rooms`
//!   and `amenity_score` reads `has_heating_cooling` as just derived
//!
//! ## NOT Responsible For
//! - Training-time-only fields (`price_per_sqft`, `size_category`) — their
//!   derivation needs context this service does not have, so they stay absent
//! - Column alignment and sentinel filling (that belongs to `orchestrate`)

use serde_json::Value;

use crate::coerce::{coerce_boolean_flag, coerce_float};
use crate::AttributeMap;

/// Every feature name this engine may add to a row.
pub const DERIVED_FEATURE_KEYS: [&str; 13] = [
    "area_x_mainroad",
    "luxury_x_area",
    "bathrooms_x_stories",
    "sqrt_area",
    "log_area",
    "area_squared",
    "total_rooms",
    "area_per_room",
    "has_heating_cooling",
    "multiple_stories",
    "high_end_parking",
    "amenity_score",
    "volume_score",
];

/// Merge a derived value into the row at `key`, unless the key is already
/// present (caller input wins) or the value is `None`/non-finite (the
/// dependency gate suppressed the computation).
fn fill_missing(row: &mut AttributeMap, key: &str, value: Option<f64>) {
    if row.contains_key(key) {
        return;
    }
    // Number::from_f64 rejects NaN and ±inf, so a poisoned computation
    // leaves the key absent for sentinel filling downstream.
    if let Some(n) = value.and_then(serde_json::Number::from_f64) {
        row.insert(key.to_string(), Value::Number(n));
    }
}

/// Read a base numeric attribute: absent keys use `absent_default`, present
/// but non-numeric values poison to NaN.
fn base_float(row: &AttributeMap, key: &str, absent_default: f64) -> f64 {
    match row.get(key) {
        Some(v) => coerce_float(Some(v), f64::NAN),
        None => absent_default,
    }
}

/// Compute the derived-feature catalogue over a partial attribute row.
///
/// Returns a copy of the input extended with every derivable field. Fields
/// already present in the input are preserved unchanged, so applying this
/// twice yields the same row as applying it once.
///
/// # Panics
///
/// This function never panics.
pub fn derive_features(row: &AttributeMap) -> AttributeMap {
    let mut out = row.clone();

    let area = base_float(row, "area", f64::NAN);
    let bedrooms = base_float(row, "bedrooms", f64::NAN);
    let bathrooms = base_float(row, "bathrooms", f64::NAN);
    let stories = base_float(row, "stories", f64::NAN);
    let parking = base_float(row, "parking", 0.0);
    let luxury = base_float(row, "luxury_score", 0.0);

    let mainroad = coerce_boolean_flag(row.get("mainroad")) as f64;
    let guestroom = coerce_boolean_flag(row.get("guestroom"));
    let basement = coerce_boolean_flag(row.get("basement"));
    let hotwater = coerce_boolean_flag(row.get("hotwaterheating"));
    let ac = coerce_boolean_flag(row.get("airconditioning"));
    let prefarea = coerce_boolean_flag(row.get("prefarea"));

    let has_area = !area.is_nan();

    fill_missing(&mut out, "area_x_mainroad", has_area.then(|| area * mainroad));
    fill_missing(&mut out, "luxury_x_area", has_area.then(|| area * luxury));
    fill_missing(
        &mut out,
        "bathrooms_x_stories",
        (!bathrooms.is_nan() && !stories.is_nan()).then(|| bathrooms * stories),
    );
    fill_missing(&mut out, "sqrt_area", has_area.then(|| area.max(0.0).sqrt()));
    fill_missing(&mut out, "log_area", has_area.then(|| area.max(0.0).ln_1p()));
    fill_missing(&mut out, "area_squared", has_area.then(|| area * area));
    fill_missing(
        &mut out,
        "total_rooms",
        (!bedrooms.is_nan() && !bathrooms.is_nan()).then(|| bedrooms + bathrooms),
    );

    // Reads total_rooms back from the row: either just derived above or
    // caller-supplied. Absent/non-numeric total_rooms poisons the quotient,
    // suppressing the field.
    let total_rooms = coerce_float(out.get("total_rooms"), f64::NAN);
    let denom = if total_rooms.is_nan() {
        f64::NAN
    } else {
        total_rooms.max(1.0)
    };
    fill_missing(&mut out, "area_per_room", has_area.then(|| area / denom));

    if !out.contains_key("has_heating_cooling") {
        out.insert(
            "has_heating_cooling".to_string(),
            Value::from(i64::from(hotwater == 1 || ac == 1)),
        );
    }
    fill_missing(
        &mut out,
        "multiple_stories",
        (!stories.is_nan()).then(|| f64::from(u8::from(stories > 1.0))),
    );
    fill_missing(
        &mut out,
        "high_end_parking",
        (!parking.is_nan()).then(|| f64::from(u8::from(parking >= 2.0))),
    );

    // has_heating_cooling is read back from the row for the same reason as
    // total_rooms above.
    let heating_cooling = coerce_float(out.get("has_heating_cooling"), f64::NAN);
    fill_missing(
        &mut out,
        "amenity_score",
        (!heating_cooling.is_nan())
            .then(|| (guestroom + basement + prefarea) as f64 + heating_cooling),
    );
    fill_missing(
        &mut out,
        "volume_score",
        (has_area && !stories.is_nan()).then(|| area * stories),
    );

    out
}

//! Reconciliation and prediction orchestration.
//!
//! ## Responsibility
//! Take a raw client attribute mapping and produce a prediction, trying the
//! cheapest strategy first:
//!
//! 1. Normalize the known binary attribute keys to 0/1
//! 2. Direct attempt: hand the row to the predictor exactly as given
//! 3. On any direct failure (shape mismatch, missing columns, type errors —
//!    all collapsed into one trigger): derive features, align onto the
//!    expected column set, sanitize, and predict again
//!
//! ## Guarantees
//! - Direct-attempt failures are absorbed here, logged at `debug`, and never
//!   surfaced to the caller
//! - The final failure carries the underlying model error as its source
//! - No retries: a step-7 failure is final for the request
//!
//! ## NOT Responsible For
//! - HTTP translation of errors into response envelopes (`web_api`)
//! - Derivation formulas (`derive`) and scalar coercion (`coerce`)

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::coerce::{coerce_boolean_flag, coerce_float};
use crate::derive::derive_features;
use crate::model::{FeatureSchema, ModelError, Predictor};
use crate::{AttributeMap, FeatureRow, BINARY_ATTRIBUTE_KEYS};

/// Terminal prediction failure: every reconciliation strategy was exhausted
/// and the sanitized, aligned row still failed at the predictor.
#[derive(Error, Debug)]
#[error("prediction failed after feature reconciliation: {source}")]
pub struct PredictionError {
    /// The model error from the final prediction attempt.
    #[source]
    pub source: ModelError,
}

/// Normalize the known binary attribute keys in place via boolean coercion.
///
/// Only keys already present in the row are touched; nothing is added.
fn normalize_binary_flags(row: &mut AttributeMap) {
    for key in BINARY_ATTRIBUTE_KEYS {
        if let Some(value) = row.get(key) {
            let flag = coerce_boolean_flag(Some(value));
            row.insert(key.to_string(), Value::from(flag));
        }
    }
}

/// Build a numeric row from the mapping exactly as given, with no coercion
/// beyond JSON numbers and booleans. `None` means the row is not directly
/// consumable (a string, null, or structured value is present).
fn strict_numeric_row(row: &AttributeMap) -> Option<FeatureRow> {
    let mut out = FeatureRow::new();
    for (key, value) in row {
        let v = match value {
            Value::Number(n) => n.as_f64()?,
            Value::Bool(b) => f64::from(u8::from(*b)),
            _ => return None,
        };
        out.insert(key.clone(), v);
    }
    Some(out)
}

/// Resolve the expected column set from prioritized sources: the predictor's
/// self-reported columns, else the external schema's feature names, else the
/// derived row's own keys. First non-empty source wins.
fn resolve_columns(
    predictor: &dyn Predictor,
    schema: Option<&FeatureSchema>,
    derived: &AttributeMap,
) -> Vec<String> {
    let sources = [
        predictor.expected_columns().map(<[String]>::to_vec),
        schema.map(|s| s.feature_names.clone()),
    ];
    for source in sources.into_iter().flatten() {
        if !source.is_empty() {
            return source;
        }
    }
    derived.keys().cloned().collect()
}

/// Restrict the derived row to the expected columns, substituting the NaN
/// sentinel for anything absent or non-numeric.
fn align_row(derived: &AttributeMap, columns: &[String]) -> FeatureRow {
    columns
        .iter()
        .map(|col| (col.clone(), coerce_float(derived.get(col), f64::NAN)))
        .collect()
}

/// Replace every non-finite entry (NaN, ±inf) with 0 in place.
///
/// This is the single place where unresolved sentinel values are
/// substituted. Zero-as-default for a missing feature is inherited behavior
/// from the training pipeline, not a verified-safe policy for arbitrary
/// models.
fn sanitize_row(row: &mut FeatureRow) {
    for value in row.values_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
}

/// Predict from a raw attribute mapping, reconciling its shape with the
/// model's expectations when needed.
///
/// Returns the prediction together with the exact feature row that was
/// passed to the predictor, so callers can echo it back for debugging.
///
/// # Errors
///
/// Returns [`PredictionError`] when the fallback path — derive, align,
/// sanitize — still fails at the predictor. Direct-attempt failures never
/// surface here.
///
/// # Panics
///
/// This function never panics.
pub fn predict_with_fallback(
    predictor: &dyn Predictor,
    schema: Option<&FeatureSchema>,
    data: &AttributeMap,
) -> Result<(f64, FeatureRow), PredictionError> {
    let mut row = data.clone();
    normalize_binary_flags(&mut row);

    // Fast path: the payload may already match training-time columns, or
    // the predictor may embed its own preprocessing.
    if let Some(direct) = strict_numeric_row(&row) {
        match predictor.predict(&direct) {
            Ok(prediction) => return Ok((prediction, direct)),
            Err(e) => debug!(error = %e, "direct prediction failed, deriving features"),
        }
    } else {
        debug!("payload not directly consumable, deriving features");
    }

    let derived = derive_features(&row);
    let columns = resolve_columns(predictor, schema, &derived);
    let mut final_row = align_row(&derived, &columns);
    sanitize_row(&mut final_row);

    match predictor.predict(&final_row) {
        Ok(prediction) => Ok((prediction, final_row)),
        Err(source) => Err(PredictionError { source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstantPredictor;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_direct_attempt_fast_path() {
        let predictor = ConstantPredictor::with_columns(42.0, cols(&["area", "bedrooms"]));
        let data = attrs(&[("area", json!(1200)), ("bedrooms", json!(3))]);
        let (y, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        assert_eq!(y, 42.0);
        assert_eq!(used.get("area"), Some(&1200.0));
        assert_eq!(used.get("bedrooms"), Some(&3.0));
    }

    #[test]
    fn test_extra_column_triggers_fallback_alignment() {
        // Direct attempt fails on extra_junk; fallback aligns to exactly the
        // predictor's self-reported columns.
        let predictor = ConstantPredictor::with_columns(7.0, cols(&["area", "bedrooms"]));
        let data = attrs(&[
            ("area", json!(1200)),
            ("bedrooms", json!(3)),
            ("extra_junk", json!("x")),
        ]);
        let (y, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        assert_eq!(y, 7.0);
        assert_eq!(used.len(), 2);
        assert_eq!(used.get("area"), Some(&1200.0));
        assert_eq!(used.get("bedrooms"), Some(&3.0));
    }

    #[test]
    fn test_binary_flags_normalized_before_direct_attempt() {
        let predictor = ConstantPredictor::with_columns(1.0, cols(&["area", "mainroad"]));
        let data = attrs(&[("area", json!(1000)), ("mainroad", json!("oui"))]);
        let (_, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        assert_eq!(used.get("mainroad"), Some(&1.0));
    }

    #[test]
    fn test_missing_columns_filled_with_zero_after_sanitize() {
        // "volume_score" is derivable from area+stories; "mystery" is not
        // derivable and must arrive as 0 after sentinel substitution.
        let predictor =
            ConstantPredictor::with_columns(3.0, cols(&["area", "volume_score", "mystery"]));
        let data = attrs(&[("area", json!(500)), ("stories", json!(2))]);
        let (y, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        assert_eq!(y, 3.0);
        assert_eq!(used.get("volume_score"), Some(&1000.0));
        assert_eq!(used.get("mystery"), Some(&0.0));
    }

    #[test]
    fn test_unresolvable_values_zeroed_in_fallback() {
        // A null forces the fallback; the unresolved column reaches the
        // predictor as 0 after sentinel substitution.
        let predictor = ConstantPredictor::with_columns(5.0, cols(&["area"]));
        let data = attrs(&[("area", Value::Null), ("junk", json!("?"))]);
        let (_, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        assert_eq!(used.get("area"), Some(&0.0));
    }

    #[test]
    fn test_schema_used_when_predictor_reports_no_columns() {
        let predictor = ConstantPredictor::new(9.0);
        let schema = FeatureSchema {
            feature_names: cols(&["area", "sqrt_area"]),
        };
        // A string value forces the fallback path even for a lenient predictor.
        let data = attrs(&[("area", json!("1600")), ("note", json!("corner lot"))]);
        let (_, used) =
            predict_with_fallback(&predictor, Some(&schema), &data).expect("test: predict");
        assert_eq!(used.len(), 2);
        assert_eq!(used.get("area"), Some(&1600.0));
        assert_eq!(used.get("sqrt_area"), Some(&40.0));
    }

    #[test]
    fn test_derived_row_keys_used_as_last_resort() {
        let predictor = ConstantPredictor::new(2.0);
        let data = attrs(&[("area", json!("800")), ("stories", json!(1))]);
        let (_, used) = predict_with_fallback(&predictor, None, &data).expect("test: predict");
        // Without predictor columns or a schema, the derived row's own keys
        // define the final vector.
        assert!(used.contains_key("area"));
        assert!(used.contains_key("sqrt_area"));
        assert!(used.contains_key("volume_score"));
    }

    #[test]
    fn test_empty_schema_falls_through_to_derived_keys() {
        let predictor = ConstantPredictor::new(2.0);
        let schema = FeatureSchema {
            feature_names: vec![],
        };
        let data = attrs(&[("area", json!("100"))]);
        let (_, used) =
            predict_with_fallback(&predictor, Some(&schema), &data).expect("test: predict");
        assert!(used.contains_key("sqrt_area"));
    }

    #[test]
    fn test_exhausted_strategies_surface_final_error() {
        struct AlwaysFails;
        impl Predictor for AlwaysFails {
            fn predict(&self, _row: &FeatureRow) -> Result<f64, ModelError> {
                Err(ModelError::MissingColumn("price_per_sqft".to_string()))
            }
        }

        let err = predict_with_fallback(&AlwaysFails, None, &attrs(&[("area", json!(1))]))
            .unwrap_err();
        assert!(matches!(err.source, ModelError::MissingColumn(ref k) if k == "price_per_sqft"));
        assert!(err.to_string().contains("feature reconciliation"));
    }

    #[test]
    fn test_input_mapping_is_not_mutated() {
        let predictor = ConstantPredictor::new(1.0);
        let data = attrs(&[("mainroad", json!("yes")), ("area", json!(10))]);
        let before = data.clone();
        let _ = predict_with_fallback(&predictor, None, &data);
        assert_eq!(data, before);
    }
}

//! # housing-price-api
//!
//! HTTP service exposing a trained housing-price regression model, with a
//! feature-reconciliation layer that bridges loosely-specified client
//! payloads to the exact feature vector the model was trained on.
//!
//! ## Architecture
//!
//! ```text
//! payload → orchestrate: direct attempt | coerce → derive → align → sanitize → predict
//! ```
//!
//! - [`coerce`] — pure scalar normalization (boolean flags, floats)
//! - [`derive`] — derived-feature computation, fill-only-if-absent
//! - [`model`] — artifact loading and the [`Predictor`] abstraction
//! - [`orchestrate`] — direct-attempt-then-fallback prediction
//! - [`web_api`] — axum HTTP surface (`POST /predict`, `GET /health`)
//! - [`config`] — environment/TOML service configuration

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use std::collections::BTreeMap;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod coerce;
pub mod config;
pub mod derive;
pub mod model;
pub mod orchestrate;
pub mod web_api;

// Re-exports for convenience
pub use model::{FeatureSchema, LinearPredictor, ModelError, Predictor};
pub use orchestrate::{predict_with_fallback, PredictionError};
pub use web_api::{start_server, AppState, ServerConfig};

/// Caller-supplied partial record: feature name → untyped scalar.
///
/// This is the raw `data` field of a prediction request, before any
/// coercion or derivation has been applied.
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;

/// A fully numeric, named feature row — the shape the predictor consumes.
pub type FeatureRow = BTreeMap<String, f64>;

/// The binary base attributes normalized to 0/1 before any prediction
/// attempt. Only these keys are touched during normalization.
pub const BINARY_ATTRIBUTE_KEYS: [&str; 6] = [
    "mainroad",
    "guestroom",
    "basement",
    "hotwaterheating",
    "airconditioning",
    "prefarea",
];

/// Recommended base input names, surfaced in error responses so callers
/// know what to send. The last three are optional enrichments.
pub const BASE_INPUT_HINTS: [&str; 15] = [
    "area",
    "bedrooms",
    "bathrooms",
    "stories",
    "mainroad",
    "guestroom",
    "basement",
    "hotwaterheating",
    "airconditioning",
    "parking",
    "prefarea",
    "furnishing_numeric",
    "luxury_score",
    "price_per_sqft",
    "size_category",
];

/// Error returned when the global tracing subscriber cannot be installed.
#[derive(Error, Debug)]
#[error("failed to install tracing subscriber: {0}")]
pub struct InitTracingError(String);

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///   for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`InitTracingError`] if the global subscriber has already been
/// set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing() -> Result<(), InitTracingError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| InitTracingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_keys_are_a_subset_of_base_hints() {
        for key in BINARY_ATTRIBUTE_KEYS {
            assert!(
                BASE_INPUT_HINTS.contains(&key),
                "binary key {key} missing from base hints"
            );
        }
    }

    #[test]
    fn test_base_hints_start_with_area() {
        assert_eq!(BASE_INPUT_HINTS[0], "area");
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        // First call may succeed or fail depending on test execution order
        // (another test may have already installed a subscriber).
        let _ = init_tracing();
        // Second call must not panic — it should return Err.
        let result = init_tracing();
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}

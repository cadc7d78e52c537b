//! Model artifact loading and the predictor abstraction
//!
//! Provides the [`Predictor`] trait and the implementations the service
//! ships with:
//! - [`LinearPredictor`]: linear regression loaded from a JSON artifact
//! - [`ConstantPredictor`]: testing/demo predictor
//!
//! Also loads the optional [`FeatureSchema`] descriptor used when the
//! predictor does not self-report its expected input columns.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::FeatureRow;

/// Errors produced while loading or invoking a model artifact.
///
/// All variants implement `std::error::Error` via [`thiserror`].
#[derive(Error, Debug)]
pub enum ModelError {
    /// The artifact file does not exist at the configured path.
    #[error("model artifact not found at {path}")]
    ArtifactMissing {
        /// Path that was probed for the artifact.
        path: String,
    },

    /// The artifact file exists but could not be read.
    #[error("failed to read model artifact {path}: {source}")]
    ArtifactRead {
        /// Path of the unreadable artifact.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact file is not a valid serialized predictor.
    #[error("failed to parse model artifact {path}: {source}")]
    ArtifactParse {
        /// Path of the corrupt artifact.
        path: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The input row lacks a column the predictor requires.
    #[error("missing expected column {0:?}")]
    MissingColumn(String),

    /// The input row carries a column the predictor was not trained on.
    #[error("unexpected column {0:?}")]
    UnexpectedColumn(String),

    /// The input row contains a NaN or infinite value.
    #[error("non-finite value in column {0:?}")]
    NonFiniteValue(String),
}

/// Trait for trained regression predictors.
///
/// Implementations must be thread-safe (Send + Sync): a single predictor is
/// loaded at startup and shared read-only across all request handlers via
/// `Arc<dyn Predictor>`. Prediction is synchronous and CPU-bound.
pub trait Predictor: Send + Sync {
    /// Score a single named feature row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the row's shape does not match what the
    /// predictor was trained on, or if any value is non-finite.
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError>;

    /// The ordered column list this predictor expects, if it self-reports
    /// one. `None` means the caller must resolve columns elsewhere.
    fn expected_columns(&self) -> Option<&[String]> {
        None
    }
}

// ============================================================================
// Linear Predictor
// ============================================================================

/// On-disk artifact shape for [`LinearPredictor`].
#[derive(Debug, Deserialize)]
struct LinearArtifact {
    intercept: f64,
    coefficients: BTreeMap<String, f64>,
    /// Training-time input columns, in order. Optional: older artifacts
    /// predate column self-reporting.
    #[serde(default)]
    feature_names_in: Option<Vec<String>>,
}

/// Linear regression predictor deserialized from a JSON artifact.
///
/// Artifact format:
///
/// ```json
/// {
///   "intercept": 152000.0,
///   "coefficients": {"area": 310.5, "bedrooms": 12000.0},
///   "feature_names_in": ["area", "bedrooms"]
/// }
/// ```
///
/// When `feature_names_in` is present the predictor is strict about its
/// input shape: a row must carry exactly that column set. Without it, the
/// predictor requires its coefficient columns and ignores extras.
#[derive(Debug)]
pub struct LinearPredictor {
    intercept: f64,
    coefficients: BTreeMap<String, f64>,
    columns: Option<Vec<String>>,
}

impl LinearPredictor {
    /// Load a predictor from a JSON artifact file.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ArtifactMissing`] if the file does not exist.
    /// - [`ModelError::ArtifactRead`] if it cannot be read.
    /// - [`ModelError::ArtifactParse`] if it is not a valid artifact.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::ArtifactMissing {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ModelError::ArtifactRead {
            path: path.display().to_string(),
            source: e,
        })?;

        let artifact: LinearArtifact =
            serde_json::from_str(&content).map_err(|e| ModelError::ArtifactParse {
                path: path.display().to_string(),
                source: e,
            })?;

        Ok(Self {
            intercept: artifact.intercept,
            coefficients: artifact.coefficients,
            columns: artifact.feature_names_in,
        })
    }

    /// Build a predictor directly from its parameters, mainly for tests.
    pub fn from_parts(
        intercept: f64,
        coefficients: BTreeMap<String, f64>,
        columns: Option<Vec<String>>,
    ) -> Self {
        Self {
            intercept,
            coefficients,
            columns,
        }
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        if let Some(columns) = &self.columns {
            for col in columns {
                if !row.contains_key(col) {
                    return Err(ModelError::MissingColumn(col.clone()));
                }
            }
            for key in row.keys() {
                if !columns.contains(key) {
                    return Err(ModelError::UnexpectedColumn(key.clone()));
                }
            }
        }

        for (key, value) in row {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteValue(key.clone()));
            }
        }

        let mut score = self.intercept;
        for (name, weight) in &self.coefficients {
            match row.get(name) {
                Some(value) => score += weight * value,
                None => return Err(ModelError::MissingColumn(name.clone())),
            }
        }

        Ok(score)
    }

    fn expected_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }
}

// ============================================================================
// Constant Predictor (Testing)
// ============================================================================

/// Dummy predictor for testing.
///
/// Always returns the same score, but enforces the same input-shape rules
/// as a real predictor when constructed with a column list. Useful for
/// orchestrator and HTTP smoke tests without a model artifact on disk.
pub struct ConstantPredictor {
    /// The score returned for every accepted row.
    pub value: f64,
    columns: Option<Vec<String>>,
}

impl ConstantPredictor {
    /// Predictor that accepts any numeric row.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            columns: None,
        }
    }

    /// Predictor that requires exactly the given column set.
    pub fn with_columns(value: f64, columns: Vec<String>) -> Self {
        Self {
            value,
            columns: Some(columns),
        }
    }
}

impl Predictor for ConstantPredictor {
    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        if let Some(columns) = &self.columns {
            for col in columns {
                if !row.contains_key(col) {
                    return Err(ModelError::MissingColumn(col.clone()));
                }
            }
            for key in row.keys() {
                if !columns.contains(key) {
                    return Err(ModelError::UnexpectedColumn(key.clone()));
                }
            }
        }

        for (key, value) in row {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteValue(key.clone()));
            }
        }

        Ok(self.value)
    }

    fn expected_columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }
}

// ============================================================================
// Feature Schema
// ============================================================================

/// External feature-schema descriptor: the ordered feature-name list the
/// model was trained on, used only when the predictor does not self-report
/// its columns.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeatureSchema {
    /// Ordered feature identifiers.
    pub feature_names: Vec<String>,
}

impl FeatureSchema {
    /// Load the schema descriptor from a JSON file.
    ///
    /// Tolerant by design: a missing, unreadable, or malformed file yields
    /// `None` (the service then resolves columns per-request from the shape
    /// of the derived row), with a warning logged for operators.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "feature schema unavailable");
                return None;
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "feature schema malformed");
                None
            }
        }
    }
}

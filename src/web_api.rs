//! Web API Server
//!
//! Provides the HTTP surface for the housing-price prediction service.
//!
//! ## Endpoints
//!
//! - `POST /predict` — Predict a price from a partial attribute mapping
//! - `GET  /health` — Model-loaded status and declared feature names
//!
//! Prediction failures are never opaque: the error body carries the
//! expected-column hint, the recommended base inputs, and the declared
//! feature names missing from the payload.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{FeatureSchema, Predictor};
use crate::orchestrate::predict_with_fallback;
use crate::{AttributeMap, FeatureRow, BASE_INPUT_HINTS};

// ============================================================================
// Types & Configuration
// ============================================================================

/// Default bind host: all interfaces.
fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default bind port.
fn default_port() -> u16 {
    8000
}

/// Default body limit: 1MB — payloads are small attribute maps.
fn default_max_request_size() -> usize {
    1024 * 1024
}

/// Configuration for the prediction HTTP server.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address or hostname to bind to (e.g. `"0.0.0.0"` for all interfaces).
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum allowed request body size in bytes.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
        }
    }
}

/// JSON body for `POST /predict`.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Partial mapping of feature name to arbitrary scalar. The service
    /// coerces and derives whatever it can.
    pub data: AttributeMap,
    /// If `true`, echo back the exact feature row passed to the predictor.
    #[serde(default)]
    pub return_features: bool,
}

/// JSON response body for a successful prediction.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Predicted price.
    pub prediction: f64,
    /// The resolved feature row, present only when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_features: Option<FeatureRow>,
}

/// Shared application state available to all handlers.
///
/// The predictor and schema are loaded once at startup and never mutated,
/// so concurrent requests read them without coordination.
pub struct AppState {
    predictor: Option<Arc<dyn Predictor>>,
    schema: Option<FeatureSchema>,
}

impl AppState {
    /// Build the shared state from whatever the artifact loader produced.
    ///
    /// `predictor: None` puts the service in degraded mode: `/predict`
    /// answers 503 until the process is restarted with a valid artifact.
    pub fn new(predictor: Option<Arc<dyn Predictor>>, schema: Option<FeatureSchema>) -> Self {
        Self { predictor, schema }
    }

    /// Declared feature names from the external schema, if one was loaded.
    fn declared_features(&self) -> Option<&[String]> {
        self.schema
            .as_ref()
            .map(|s| s.feature_names.as_slice())
            .filter(|names| !names.is_empty())
    }
}

// ============================================================================
// Server
// ============================================================================

/// Start the prediction API server.
///
/// Binds to `config.host:config.port` and serves the prediction and health
/// endpoints. Blocks until the server shuts down.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
///
/// # Panics
///
/// This function never panics.
pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);

    info!("Starting prediction API server on http://{}", addr);

    let state = Arc::new(state);

    let app = Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(
            config.max_request_size,
            body_size_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated.
///
/// # Panics
///
/// This function never panics.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
///
/// # Panics
///
/// This function never panics.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({"error": "Request body too large"})),
            )
                .into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /predict` — Predict a price from a partial attribute mapping.
///
/// Runs the reconciliation orchestrator on a blocking worker thread
/// (prediction is synchronous and CPU-bound).
///
/// # Panics
///
/// This function never panics.
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Some(predictor) = state.predictor.as_ref() else {
        return Err(ApiError::ModelUnavailable);
    };

    let predictor = Arc::clone(predictor);
    let schema = state.schema.clone();
    let data = req.data.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        predict_with_fallback(predictor.as_ref(), schema.as_ref(), &data)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    match outcome {
        Ok((prediction, used)) => Ok(Json(PredictResponse {
            prediction,
            used_features: req.return_features.then_some(used),
        })),
        Err(e) => {
            warn!(error = %e, "prediction failed for request payload");
            Err(prediction_failure(&state, &req.data, e.to_string()))
        }
    }
}

/// Build the diagnostic 400 envelope for an exhausted prediction.
///
/// `missing_keys` is computed only when a feature-name schema is known.
fn prediction_failure(state: &AppState, data: &AttributeMap, error: String) -> ApiError {
    let (expected_columns, missing_keys) = match state.declared_features() {
        Some(names) => (
            serde_json::json!(names),
            names
                .iter()
                .filter(|name| !data.contains_key(*name))
                .cloned()
                .collect(),
        ),
        None => (serde_json::json!("unknown"), Vec::new()),
    };

    ApiError::PredictionFailed {
        error,
        expected_columns,
        missing_keys,
    }
}

/// `GET /health` — Health check endpoint.
///
/// # Panics
///
/// This function never panics.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let features = match state.declared_features() {
        Some(names) => serde_json::json!(names),
        None => serde_json::json!("unknown"),
    };

    Json(serde_json::json!({
        "status": "ok",
        "model_loaded": state.predictor.is_some(),
        "features": features,
    }))
}

// ============================================================================
// Error Type
// ============================================================================

/// Application-level errors returned by API handlers.
///
/// Each variant maps to an HTTP status code and a JSON error body.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug)]
enum ApiError {
    /// No predictor is loaded; the service is in degraded mode.
    ModelUnavailable,
    /// Every reconciliation strategy was exhausted; the body carries
    /// diagnostic hints so the caller can fix the payload.
    PredictionFailed {
        /// Description of the final prediction failure.
        error: String,
        /// Declared feature-name list, or the string `"unknown"`.
        expected_columns: serde_json::Value,
        /// Declared feature names absent from the caller's payload.
        missing_keys: Vec<String>,
    },
    /// The prediction task could not be joined.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::ModelUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "model not loaded; train and deploy an artifact first"
                })),
            )
                .into_response(),
            ApiError::PredictionFailed {
                error,
                expected_columns,
                missing_keys,
            } => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": error,
                    "hint": {
                        "expected_columns": expected_columns,
                        "recommended_base_inputs": BASE_INPUT_HINTS,
                    },
                    "missing_keys": missing_keys,
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": message})),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstantPredictor;
    use serde_json::json;

    #[test]
    fn test_predict_request_minimal_deserializes() {
        let json = r#"{"data": {"area": 1200}}"#;
        let req: PredictRequest = serde_json::from_str(json).expect("deser");
        assert_eq!(req.data.get("area"), Some(&json!(1200)));
        assert!(!req.return_features);
    }

    #[test]
    fn test_predict_request_full_deserializes() {
        let json = r#"{
            "data": {"area": 1200, "mainroad": "yes"},
            "return_features": true
        }"#;
        let req: PredictRequest = serde_json::from_str(json).expect("deser");
        assert_eq!(req.data.len(), 2);
        assert!(req.return_features);
    }

    #[test]
    fn test_predict_response_omits_features_unless_requested() {
        let resp = PredictResponse {
            prediction: 123.0,
            used_features: None,
        };
        let json = serde_json::to_string(&resp).expect("ser");
        assert!(json.contains("prediction"));
        assert!(!json.contains("used_features"));
    }

    #[test]
    fn test_predict_response_includes_features_when_present() {
        let mut used = FeatureRow::new();
        used.insert("area".to_string(), 1200.0);
        let resp = PredictResponse {
            prediction: 123.0,
            used_features: Some(used),
        };
        let json = serde_json::to_value(&resp).expect("ser");
        assert_eq!(json["used_features"]["area"], 1200.0);
    }

    #[test]
    fn test_server_config_default_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.max_request_size, 1024 * 1024);
    }

    #[test]
    fn test_model_unavailable_returns_503() {
        let resp = ApiError::ModelUnavailable.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_prediction_failed_returns_400() {
        let resp = ApiError::PredictionFailed {
            error: "missing expected column \"area\"".to_string(),
            expected_columns: json!(["area"]),
            missing_keys: vec!["area".to_string()],
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_returns_500() {
        let resp = ApiError::Internal("join failed".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_prediction_failure_computes_missing_keys_from_schema() {
        let state = AppState::new(
            Some(Arc::new(ConstantPredictor::new(1.0))),
            Some(FeatureSchema {
                feature_names: vec!["area".to_string(), "bedrooms".to_string()],
            }),
        );
        let mut data = AttributeMap::new();
        data.insert("area".to_string(), json!(100));

        let err = prediction_failure(&state, &data, "boom".to_string());
        match err {
            ApiError::PredictionFailed {
                expected_columns,
                missing_keys,
                ..
            } => {
                assert_eq!(expected_columns, json!(["area", "bedrooms"]));
                assert_eq!(missing_keys, vec!["bedrooms".to_string()]);
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn test_prediction_failure_without_schema_reports_unknown() {
        let state = AppState::new(None, None);
        let err = prediction_failure(&state, &AttributeMap::new(), "boom".to_string());
        match err {
            ApiError::PredictionFailed {
                expected_columns,
                missing_keys,
                ..
            } => {
                assert_eq!(expected_columns, json!("unknown"));
                assert!(missing_keys.is_empty());
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}

//! Server binary for housing-price-api
//!
//! Loads the model artifact and feature schema once at startup, then serves
//! the prediction API. A missing or corrupt artifact does not abort startup:
//! the service runs in degraded mode and `/predict` answers 503.
//!
//! ## Environment Variables
//!
//! - `CONFIG_PATH` — optional TOML configuration file
//! - `MODEL_DIR` / `MODEL_FILE` / `FEATURE_INFO_FILE` — artifact locations
//! - `BIND_HOST` / `BIND_PORT` — server binding
//! - `LOG_FORMAT=json` — structured JSON output (production)
//! - `RUST_LOG=info` — log level filter

use std::sync::Arc;

use housing_price_api::{
    config, init_tracing, start_server, AppState, FeatureSchema, LinearPredictor, Predictor,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize structured tracing (JSON or pretty, based on LOG_FORMAT env)
    let _ = init_tracing();

    let config = config::load()?;
    info!(
        model = %config.model_path().display(),
        "Starting housing-price-api"
    );

    // Degraded mode on a missing/corrupt artifact: the handler reports 503
    // per request instead of the process dying.
    let predictor: Option<Arc<dyn Predictor>> = match LinearPredictor::load(&config.model_path()) {
        Ok(p) => {
            info!("Model artifact loaded");
            Some(Arc::new(p))
        }
        Err(e) => {
            warn!(error = %e, "starting without a model; /predict will return 503");
            None
        }
    };

    let schema = FeatureSchema::load(&config.feature_info_path());
    match &schema {
        Some(s) => info!(features = s.feature_names.len(), "Feature schema loaded"),
        None => info!("No feature schema; expected columns resolved per-request"),
    }

    start_server(config.server, AppState::new(predictor, schema)).await
}

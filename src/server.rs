use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{
    service::Predictor,
    types::{HealthReport, PredictionResult, PredictionSource},
};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    predictor: Arc<Predictor>,
}

pub fn router(predictor: Arc<Predictor>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/predict/overstay", post(predict_overstay))
        .layer(CorsLayer::permissive())
        .with_state(AppState { predictor })
}

// ---------- Handlers ----------

async fn status(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.predictor.health())
}

// Raw body: in fallback mode even undecodable input gets the fallback answer.
async fn predict_overstay(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PredictionResult>), (StatusCode, Json<serde_json::Value>)> {
    tracing::debug!("received prediction request ({} bytes)", body.len());
    match state.predictor.predict_from_json(&body) {
        Ok(out) => {
            let code = match out.source {
                PredictionSource::MlModel => StatusCode::OK,
                PredictionSource::Fallback => StatusCode::SERVICE_UNAVAILABLE,
            };
            Ok((code, Json(out)))
        }
        Err(e) => {
            tracing::warn!("prediction failed: {}", e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Prediction failed", "details": e.to_string() })),
            ))
        }
    }
}

use std::path::Path;

use thiserror::Error;

use crate::{
    features::{FeatureVector, TimestampError, FEATURE_NAMES},
    pipeline::OverstayPipeline,
    store::LoadOutcome,
    types::{BookingRequest, HealthReport, ModelStatus, PredictionResult, PredictionSource},
};

/// Minutes reported for every request while no model is loaded.
pub const FALLBACK_OVERSTAY_MINUTES: u32 = 10;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("malformed request body: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    InvalidTimestamp(#[from] TimestampError),
}

/// Load-once prediction handle. Built at startup, read-only afterwards.
#[derive(Debug)]
pub struct Predictor {
    model: Option<OverstayPipeline>,
}

impl Predictor {
    pub fn new(model: OverstayPipeline) -> Self {
        Self { model: Some(model) }
    }

    pub fn without_model() -> Self {
        Self { model: None }
    }

    pub fn from_load_outcome(outcome: LoadOutcome, path: &Path) -> Self {
        match outcome {
            LoadOutcome::Found(model) => {
                tracing::info!("model loaded from {}", path.display());
                Self::new(model)
            }
            LoadOutcome::NotFound => {
                tracing::warn!(
                    "model file not found at {}; serving fallback predictions (run train_model first)",
                    path.display()
                );
                Self::without_model()
            }
            LoadOutcome::Corrupt(e) => {
                tracing::error!("error loading model from {}: {}", path.display(), e);
                Self::without_model()
            }
        }
    }

    pub fn model_status(&self) -> ModelStatus {
        if self.model.is_some() {
            ModelStatus::Loaded
        } else {
            ModelStatus::NotFound
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::new(self.model_status())
    }

    /// Decodes a JSON body and predicts. Without a model this returns the
    /// fallback before looking at the body at all.
    pub fn predict_from_json(&self, body: &[u8]) -> Result<PredictionResult, PredictError> {
        if self.model.is_none() {
            return Ok(self.fallback());
        }
        let req: BookingRequest = serde_json::from_slice(body)?;
        self.predict_overstay(&req)
    }

    pub fn predict_overstay(&self, req: &BookingRequest) -> Result<PredictionResult, PredictError> {
        let Some(model) = &self.model else {
            return Ok(self.fallback());
        };
        let start = req
            .start_time
            .as_deref()
            .ok_or(PredictError::MissingField("startTime"))?;
        let end = req
            .end_time
            .as_deref()
            .ok_or(PredictError::MissingField("endTime"))?;
        let features = FeatureVector::from_booking(start, end)?;

        let raw = model.predict(&features);
        let minutes = clamp_minutes(raw);
        let inputs: Vec<String> = FEATURE_NAMES
            .iter()
            .zip(features.as_array())
            .map(|(name, v)| format!("{name}={v}"))
            .collect();
        tracing::info!(
            "prediction complete: {} raw={:.3} -> {} minutes",
            inputs.join(" "),
            raw,
            minutes
        );
        Ok(PredictionResult {
            predicted_overstay_minutes: minutes,
            source: PredictionSource::MlModel,
        })
    }

    fn fallback(&self) -> PredictionResult {
        tracing::warn!(
            "model not loaded; returning {}-minute fallback prediction",
            FALLBACK_OVERSTAY_MINUTES
        );
        PredictionResult {
            predicted_overstay_minutes: FALLBACK_OVERSTAY_MINUTES,
            source: PredictionSource::Fallback,
        }
    }
}

/// Round half to even, then floor at zero. Non-finite input maps to 0.
pub fn clamp_minutes(raw: f64) -> u32 {
    let rounded = raw.round_ties_even();
    if rounded.is_finite() && rounded > 0.0 {
        rounded as u32
    } else {
        0
    }
}

//! Offline batch job: event log in, model artifact out.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    config::TrainConfig,
    features::FeatureVector,
    ingest::{self, IngestError},
    joiner,
    pipeline::{train_test_split, FitError, OverstayPipeline, TreeParams},
    store::{self, StoreError},
    types::Event,
};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("no departure could be matched with an arrival; nothing to train on")]
    NoTrainingRecords,

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub events: usize,
    pub records: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// R² on the held-out split.
    pub r2: f64,
    pub model_path: PathBuf,
}

/// Full run. The artifact is only written once every earlier step succeeded.
pub fn run(cfg: &TrainConfig) -> Result<TrainingReport, TrainError> {
    tracing::info!("starting overstay model training");
    let events = ingest::read_events(&cfg.data_path)?;
    let (pipeline, mut report) = fit_events(&events, cfg.test_fraction, &cfg.tree_params())?;
    store::save(&pipeline, &cfg.model_path)?;
    report.model_path = cfg.model_path.clone();
    tracing::info!("training complete; model written to {}", cfg.model_path.display());
    Ok(report)
}

/// Join, derive, split and fit. The returned pipeline is trained on the
/// train split only; the held-out rows are used for scoring and then discarded.
pub fn fit_events(
    events: &[Event],
    test_fraction: f64,
    params: &TreeParams,
) -> Result<(OverstayPipeline, TrainingReport), TrainError> {
    let records = joiner::join(events);
    if records.is_empty() {
        return Err(TrainError::NoTrainingRecords);
    }
    let features: Vec<FeatureVector> = records.iter().map(|r| r.features()).collect();
    let targets: Vec<f64> = records.iter().map(|r| r.overstay_minutes()).collect();
    tracing::info!(
        "feature engineering complete: {} records from {} events",
        records.len(),
        events.len()
    );

    let split = train_test_split(records.len(), test_fraction, params.seed)?;
    let pick = |idx: &[usize]| -> (Vec<FeatureVector>, Vec<f64>) {
        idx.iter().map(|&i| (features[i], targets[i])).unzip()
    };
    let (x_train, y_train) = pick(&split.train);
    let (x_test, y_test) = pick(&split.test);

    let pipeline = OverstayPipeline::fit(&x_train, &y_train, params)?;
    let r2 = pipeline.score(&x_test, &y_test)?;
    tracing::info!("model trained; R-squared on test data: {:.2}", r2);

    Ok((
        pipeline,
        TrainingReport {
            events: events.len(),
            records: records.len(),
            train_rows: x_train.len(),
            test_rows: x_test.len(),
            r2,
            model_path: PathBuf::new(),
        },
    ))
}

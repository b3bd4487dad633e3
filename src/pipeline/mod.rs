//! Two-stage overstay estimator: standardization followed by a regression tree.
//!
//! The pipeline never clamps. Raw estimates can be negative or fractional;
//! turning them into minutes is the serving layer's job.

mod scaler;
mod tree;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use scaler::StandardScaler;
pub use tree::{DecisionTreeRegressor, Node, TreeParams};

use crate::features::{FeatureVector, N_FEATURES};

pub type Row = [f64; N_FEATURES];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("no samples to fit on")]
    Empty,

    #[error("feature/target length mismatch: {features} feature rows, {targets} targets")]
    LengthMismatch { features: usize, targets: usize },

    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidTestFraction(f64),

    #[error("{rows} rows leave nothing to train on after the test split")]
    EmptyTrainSplit { rows: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverstayPipeline {
    scaler: StandardScaler,
    tree: DecisionTreeRegressor,
}

impl OverstayPipeline {
    pub fn fit(
        features: &[FeatureVector],
        targets: &[f64],
        params: &TreeParams,
    ) -> Result<Self, FitError> {
        check_lengths(features, targets)?;
        let rows: Vec<Row> = features.iter().map(FeatureVector::as_array).collect();
        let scaler = StandardScaler::fit(&rows);
        let scaled: Vec<Row> = rows.iter().map(|r| scaler.transform(r)).collect();
        let tree = DecisionTreeRegressor::fit(&scaled, targets, params);
        tracing::debug!(
            "fitted tree: {} nodes, {} leaves, depth {}",
            tree.nodes().len(),
            tree.n_leaves(),
            tree.depth()
        );
        Ok(Self { scaler, tree })
    }

    /// Raw estimate in minutes.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.tree.predict(&self.scaler.transform(&features.as_array()))
    }

    pub fn predict_batch(&self, features: &[FeatureVector]) -> Vec<f64> {
        features.iter().map(|f| self.predict(f)).collect()
    }

    /// Coefficient of determination on held-out data.
    pub fn score(&self, features: &[FeatureVector], targets: &[f64]) -> Result<f64, FitError> {
        check_lengths(features, targets)?;
        Ok(r2_score(targets, &self.predict_batch(features)))
    }

    pub fn tree(&self) -> &DecisionTreeRegressor {
        &self.tree
    }

    pub fn n_features(&self) -> usize {
        N_FEATURES
    }
}

fn check_lengths(features: &[FeatureVector], targets: &[f64]) -> Result<(), FitError> {
    if features.len() != targets.len() {
        return Err(FitError::LengthMismatch {
            features: features.len(),
            targets: targets.len(),
        });
    }
    if features.is_empty() {
        return Err(FitError::Empty);
    }
    Ok(())
}

/// R². With zero-variance targets: 1.0 for an exact fit, 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle of `0..n`; the first `ceil(n * test_fraction)` indices
/// form the test set.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit, FitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FitError::InvalidTestFraction(test_fraction));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test >= n {
        return Err(FitError::EmptyTrainSplit { rows: n });
    }
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = perm.split_off(n_test);
    Ok(TrainTestSplit { train, test: perm })
}

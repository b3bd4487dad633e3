use serde::{Deserialize, Serialize};

use super::Row;
use crate::features::N_FEATURES;

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; N_FEATURES],
    scale: [f64; N_FEATURES],
}

impl StandardScaler {
    /// Population statistics (ddof = 0). A constant column keeps scale 1.0.
    pub fn fit(rows: &[Row]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; N_FEATURES];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = [0.0; N_FEATURES];
        for row in rows {
            for j in 0..N_FEATURES {
                let d = row[j] - mean[j];
                var[j] += d * d;
            }
        }
        let scale = var.map(|v| {
            let std = (v / n).sqrt();
            if std > f64::EPSILON {
                std
            } else {
                1.0
            }
        });
        Self { mean, scale }
    }

    pub fn transform(&self, row: &Row) -> Row {
        let mut out = *row;
        for j in 0..N_FEATURES {
            out[j] = (row[j] - self.mean[j]) / self.scale[j];
        }
        out
    }

    pub fn mean(&self) -> &[f64; N_FEATURES] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; N_FEATURES] {
        &self.scale
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::features::{minutes_between, FeatureVector};

pub const SERVICE_NAME: &str = "ParkPredict AI Service";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Occupied,
    Free,
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "occupied" => Ok(Self::Occupied),
            "free" => Ok(Self::Free),
            other => Err(format!("unknown status {other:?} (expected \"occupied\" or \"free\")")),
        }
    }
}

/// One row of the occupancy log.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    pub status: EventStatus,
    pub booked_end: Option<NaiveDateTime>, // arrival rows may leave this blank
}

/// A departure matched with the arrival that started it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationRecord {
    pub user_id: String,
    pub arrival_time: NaiveDateTime,
    pub booked_end: NaiveDateTime,
    pub actual_departure: NaiveDateTime,
}

impl ReservationRecord {
    /// Minutes past the booked end, never negative.
    pub fn overstay_minutes(&self) -> f64 {
        minutes_between(self.booked_end, self.actual_departure).max(0.0)
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector::derive(self.arrival_time, self.booked_end)
    }
}

// Both fields optional: a missing field is a validation error, not a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(rename = "startTime")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PredictionSource {
    #[serde(rename = "ml_model_v1")]
    MlModel,
    #[serde(rename = "fallback_simulation")]
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredictionResult {
    pub predicted_overstay_minutes: u32,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loaded,
    NotFound,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => f.write_str("loaded"),
            Self::NotFound => f.write_str("not_found"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub model_status: ModelStatus,
}

impl HealthReport {
    pub fn new(model_status: ModelStatus) -> Self {
        Self {
            status: "ok",
            service: SERVICE_NAME,
            model_status,
        }
    }
}

//! Parking overstay prediction: the offline training job and the online
//! predictor share the feature derivation in [`features`], so a booking is
//! described the same way at train time and at serving time.

pub mod config;
pub mod features;
pub mod ingest;
pub mod joiner;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod store;
pub mod training;
pub mod types;

use tracing_subscriber::EnvFilter;

/// fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

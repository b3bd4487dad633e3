/// End-to-end tests: event log -> training -> artifact -> predictor
///
/// Run with: cargo test --test integration_tests -- --nocapture

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use overstay_predictor::{
    config::TrainConfig,
    features::{parse_timestamp, FeatureVector},
    ingest, joiner,
    service::{clamp_minutes, Predictor, FALLBACK_OVERSTAY_MINUTES},
    store::{self, LoadOutcome},
    training,
    types::{BookingRequest, ModelStatus, PredictionSource},
};
use tempfile::tempdir;

/// Simulated lot: evening arrivals overstay by 30 minutes, weekend ones
/// by 12, everyone else leaves on time. A few departures have no arrival.
fn write_event_log(path: &Path) {
    let mut csv = String::from("user_id,timestamp,status,booked_end,spot_id\n");
    for i in 0..200u32 {
        let day = 1 + i % 28; // Feb 2024 starts on a Thursday
        let hour = 7 + i % 12;
        let arrive = format!("2024-02-{day:02} {hour:02}:00:00");
        let booked_end = format!("2024-02-{day:02} {:02}:30:00", hour + 1);
        let weekday = (day + 2) % 7; // Monday = 0
        let overstay = if hour >= 16 {
            30
        } else if weekday >= 5 {
            12
        } else {
            0
        };
        let leave = format!("2024-02-{day:02} {:02}:{:02}:00", hour + 1 + (30 + overstay) / 60, (30 + overstay) % 60);
        writeln!(csv, "user{i},{arrive},occupied,,S{}", i % 9).unwrap();
        writeln!(csv, "user{i},{leave},free,{booked_end},S{}", i % 9).unwrap();
    }
    for i in 0..5 {
        writeln!(csv, "walkin{i},2024-02-10 12:00:00,free,2024-02-10 11:00:00,S0").unwrap();
    }
    fs::write(path, csv).unwrap();
}

fn booking(start: &str, end: &str) -> BookingRequest {
    BookingRequest {
        start_time: Some(start.to_string()),
        end_time: Some(end.to_string()),
    }
}

#[test]
fn test_training_produces_a_servable_artifact() {
    println!("\n=== Test: Train -> Save -> Load -> Predict ===");
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("parking_lot_simulation_data.csv");
    write_event_log(&data_path);

    let cfg = TrainConfig {
        data_path: data_path.clone(),
        model_path: dir.path().join("models").join("overstay_model.bin"),
        ..TrainConfig::default()
    };
    let report = training::run(&cfg).unwrap();
    println!(
        "✓ Trained on {} rows ({} held out), R² = {:.3}",
        report.train_rows, report.test_rows, report.r2
    );

    assert_eq!(report.events, 405);
    assert_eq!(report.records, 200, "walk-ins without an arrival are dropped");
    assert_eq!(report.test_rows, 40);
    assert_eq!(report.train_rows, 160);
    assert!(cfg.model_path.exists());

    let LoadOutcome::Found(pipeline) = store::load(&cfg.model_path) else {
        panic!("artifact should load");
    };
    let predictor = Predictor::new(pipeline.clone());
    assert_eq!(predictor.model_status(), ModelStatus::Loaded);

    // Tuesday evening
    let out = predictor
        .predict_overstay(&booking("2024-03-05T17:00:00", "2024-03-05T18:30:00"))
        .unwrap();
    assert_eq!(out.source, PredictionSource::MlModel);
    assert_eq!(out.predicted_overstay_minutes, 30);

    // Tuesday morning
    let out = predictor
        .predict_overstay(&booking("2024-03-05T09:00:00", "2024-03-05T10:30:00"))
        .unwrap();
    assert_eq!(out.predicted_overstay_minutes, 0);
    println!("✓ Predictions follow the simulated pattern");
}

#[test]
fn test_reloaded_artifact_predicts_identically() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("events.csv");
    write_event_log(&data_path);

    let events = ingest::read_events(&data_path).unwrap();
    let cfg = TrainConfig::default();
    let (pipeline, _) = training::fit_events(&events, cfg.test_fraction, &cfg.tree_params()).unwrap();

    let model_path = dir.path().join("overstay_model.bin");
    store::save(&pipeline, &model_path).unwrap();
    let LoadOutcome::Found(reloaded) = store::load(&model_path) else {
        panic!("artifact should load");
    };

    for record in joiner::join(&events) {
        let fv = record.features();
        assert_eq!(
            clamp_minutes(reloaded.predict(&fv)),
            clamp_minutes(pipeline.predict(&fv))
        );
        assert_eq!(reloaded.predict(&fv).to_bits(), pipeline.predict(&fv).to_bits());
    }
    println!("✓ Round-trip predictions are bit-identical");
}

#[test]
fn test_training_is_reproducible() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("events.csv");
    write_event_log(&data_path);
    let events = ingest::read_events(&data_path).unwrap();
    let cfg = TrainConfig::default();

    let (a, ra) = training::fit_events(&events, cfg.test_fraction, &cfg.tree_params()).unwrap();
    let (b, rb) = training::fit_events(&events, cfg.test_fraction, &cfg.tree_params()).unwrap();
    assert_eq!(a, b);
    assert_eq!(ra, rb);
}

#[test]
fn test_removed_artifact_degrades_fresh_process() {
    println!("\n=== Test: Artifact Removal ===");
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("events.csv");
    write_event_log(&data_path);
    let cfg = TrainConfig {
        data_path,
        model_path: dir.path().join("overstay_model.bin"),
        ..TrainConfig::default()
    };
    training::run(&cfg).unwrap();
    fs::remove_file(&cfg.model_path).unwrap();

    // what a freshly started serving process would do
    let predictor = Predictor::from_load_outcome(store::load(&cfg.model_path), &cfg.model_path);
    assert_eq!(predictor.health().model_status, ModelStatus::NotFound);

    for req in [
        booking("2024-03-05T17:00:00", "2024-03-05T18:30:00"),
        booking("not a time", "also not"),
        BookingRequest::default(),
    ] {
        let out = predictor.predict_overstay(&req).unwrap();
        assert_eq!(out.predicted_overstay_minutes, FALLBACK_OVERSTAY_MINUTES);
        assert_eq!(out.source, PredictionSource::Fallback);
    }
    println!("✓ Fallback served for every request");
}

#[test]
fn test_feature_vector_matches_between_training_and_serving() {
    let arrival = parse_timestamp("2024-01-01T08:00:00").unwrap();
    let booked_end = parse_timestamp("2024-01-01T10:30:00").unwrap();
    let fv = FeatureVector::derive(arrival, booked_end);
    assert_eq!((fv.arrival_hour, fv.day_of_week, fv.booked_duration_minutes), (8, 0, 150.0));

    // the training side goes through the joiner; same vector must come out
    let csv = "user_id,timestamp,status,booked_end\n\
               a,2024-01-01T08:00:00,occupied,\n\
               a,2024-01-01T10:45:00,free,2024-01-01T10:30:00\n";
    let events = ingest::parse_events(std::io::Cursor::new(csv)).unwrap();
    let records = joiner::join(&events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].features(), fv);
    assert_eq!(records[0].overstay_minutes(), 15.0);
}

use anyhow::Context;

use overstay_predictor::{config::TrainConfig, training};

fn main() -> anyhow::Result<()> {
    overstay_predictor::init_tracing();

    let cfg = TrainConfig::from_env()?;
    let report = training::run(&cfg)
        .with_context(|| format!("training from {} failed", cfg.data_path.display()))?;

    tracing::info!(
        "trained on {} of {} records ({} held out, R-squared {:.2}); saved to {}",
        report.train_rows,
        report.records,
        report.test_rows,
        report.r2,
        report.model_path.display()
    );
    Ok(())
}

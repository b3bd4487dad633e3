use std::sync::Arc;

use overstay_predictor::{config::ServerConfig, server, service::Predictor, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    overstay_predictor::init_tracing();

    let cfg = ServerConfig::from_env()?;

    // Loaded once; a retrained artifact needs a restart to be picked up.
    let predictor = Predictor::from_load_outcome(store::load(&cfg.model_path), &cfg.model_path);
    tracing::info!("model status: {}", predictor.model_status());

    let app = server::router(Arc::new(predictor));

    let addr = cfg.socket_addr();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

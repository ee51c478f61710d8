//! FieldForge API Server
//!
//! Usage:
//!   fieldforge [config.toml]
//!
//! Without a path the config is looked up in the default locations and
//! `FIELDFORGE_*` environment variables are applied on top.

use anyhow::Context;
use fieldforge::{serve, telemetry, AppState, Config, Store};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load_with_env(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    telemetry::init(&config.logging);
    config.validate()?;

    tracing::info!("Starting FieldForge API server v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.storage.database_path();
    let store = Arc::new(
        Store::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );
    tracing::info!("Database: {:?}", db_path);

    let server = config.server.clone();
    let hourglass_enabled = config.hourglass.enabled;
    let state = AppState::new(store, config);

    let hourglass = hourglass_enabled.then(|| Arc::new(state.hourglass()));
    let worker = hourglass.clone().map(|h| h.start());

    serve(state, &server).await?;

    if let (Some(hourglass), Some(worker)) = (hourglass, worker) {
        hourglass.stop().await;
        worker.abort();
    }

    tracing::info!("FieldForge API server stopped");
    Ok(())
}

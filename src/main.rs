// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::needless_pass_by_value)]

//! Tabrelay worker
//!
//! Runs one worker role per process, selected by `RUNNING_MODE`

use tabrelay::config::{RunningMode, WorkerConfig};
use tabrelay::error::{Error, Result};
use tabrelay::extract::ExtractorManager;
use tabrelay::health;
use tabrelay::load::LoaderManager;
use tabrelay::service::ServiceRuntime;
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = WorkerConfig::from_env()?;
    info!(mode = ?config.mode, "starting the worker");

    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(error) = health::serve(health_port).await {
            tracing::error!(%error, "health endpoint failed");
        }
    });

    let mut runtime = ServiceRuntime::new();
    match config.mode {
        RunningMode::Extractor => {
            let producer = config
                .producer
                .clone()
                .ok_or_else(|| Error::missing_field("SINK_BOOTSTRAP_SERVERS"))?;
            runtime.add_manager(Box::new(ExtractorManager::new(
                config.consumer.clone(),
                producer,
            )));
        }
        RunningMode::Loader => {
            runtime.add_manager(Box::new(LoaderManager::new(config.consumer.clone())));
        }
    }

    runtime.initialize().await?;
    info!("worker started, waiting for the shutdown signal");
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received, stopping the worker");
    runtime.shutdown().await
}

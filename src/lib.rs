pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ConfigError};
use crate::core_state::CoreState;
use crate::db::{Database, DatabaseError};
use crate::pipeline::consensus::PipelineError;

/// Failures that stop the process before or while serving.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration failed: {0}")]
    Config(#[from] ConfigError),

    #[error("Database open failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Startup recovery failed: {0}")]
    Recovery(#[from] PipelineError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("API server failed: {0}")]
    Server(String),
}

/// Process entry point: configure, recover, serve until Ctrl-C.
pub fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    if let Err(e) = start() {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn start() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        read_only = config.read_only,
        reject_concurrent_reports = config.reject_concurrent_reports,
        llm = config.llm.provider.as_str(),
        model = config.llm.model(),
        "Configuration loaded"
    );

    // Blocking HTTP clients must be built outside the async runtime.
    let client = config.build_client()?;
    let db = Arc::new(Database::open(&config.db_path)?);
    let core = Arc::new(CoreState::new(config, db, client));

    // No job thread exists yet, so anything still in progress was cut off.
    core.reports.recover_interrupted()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(serve(Arc::clone(&core)))?;

    let cancelled = core.reports.jobs().cancel_all();
    if cancelled > 0 {
        tracing::info!(cancelled, "Cancelled running report jobs on shutdown");
    }
    Ok(())
}

async fn serve(core: Arc<CoreState>) -> Result<(), StartupError> {
    let addr = core.config.bind_addr;
    let server = api::start_api_server(core, addr)
        .await
        .map_err(StartupError::Server)?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl-C, serving until killed: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    server.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_keep_their_layer() {
        let err: StartupError = ConfigError::Invalid {
            key: "CONCORD_JOB_DEADLINE_SECS".into(),
            value: "0".into(),
            reason: "must be positive".into(),
        }
        .into();
        assert!(matches!(err, StartupError::Config(_)));
        assert!(err.to_string().contains("CONCORD_JOB_DEADLINE_SECS"));

        let err: StartupError = DatabaseError::LockPoisoned.into();
        assert!(matches!(err, StartupError::Database(_)));
    }
}

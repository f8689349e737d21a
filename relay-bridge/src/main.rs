//! Bridge binary: console chat wired to a conversational backend.

use std::sync::Arc;
use std::time::Duration;

use relay_bridge::backend::BackendClient;
use relay_bridge::console::ConsoleDriver;
use relay_bridge::driver::SessionDriver;
use relay_bridge::{Engine, SessionCoordinator};
use relay_common::logging::init_logging;
use relay_common::Config;

/// Pause between supervisor restarts.
const RESTART_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_with_env()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!(
        backend = %config.backend.base_url,
        workers = config.engine.workers,
        max_open_sessions = config.engine.max_open_sessions,
        "Starting relay bridge"
    );

    // Crash-only supervision: the bridge holds no state worth saving,
    // so any failure tears the whole engine down and a fresh one is
    // built from config.
    loop {
        match tokio::spawn(run_bridge(config.clone())).await {
            Ok(Ok(())) => {
                tracing::info!("Bridge stopped");
                break;
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Bridge failed, restarting");
            }
            Err(e) => {
                tracing::error!(error = %e, "Bridge crashed, restarting");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(RESTART_BACKOFF) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, not restarting");
                break;
            }
        }
    }

    Ok(())
}

/// One bridge lifetime, rebuilt from scratch on every restart.
async fn run_bridge(config: Config) -> relay_common::Result<()> {
    let (driver, inbound) = ConsoleDriver::start();
    let driver: Arc<dyn SessionDriver> = driver;
    let backend = Arc::new(BackendClient::new(&config.backend));
    let coordinator = SessionCoordinator::new(Arc::clone(&driver), backend, &config.engine);
    let mut engine = Engine::new(coordinator, driver, inbound, &config.engine);

    let result = tokio::select! {
        result = engine.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            Ok(())
        }
    };
    engine.shutdown(false).await;
    result
}

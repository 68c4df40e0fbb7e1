//! Tracing initialisation and the foreground server lifecycle.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tidewatch_api::{ApiServer, AppContext};
use tidewatch_config::{Config, LoggingConfig};

/// Initialize tracing with console and file output.
///
/// Log files are written to `log_dir` with daily rotation.
pub(crate) fn init_tracing(
    logging: &LoggingConfig,
    log_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tidewatch")
        .filename_suffix("log")
        .max_log_files(logging.max_files.max(1))
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer flushes on drop; keep it for the whole process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if logging.json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        // Console layer
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Run the orchestrator in foreground until Ctrl-C.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Tidewatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.data_path().display());

    let server_config = config.server.clone();
    let ctx = Arc::new(AppContext::from_config(config).await?);
    ctx.startup().await?;

    let server = ApiServer::new(&server_config, ctx.clone());
    info!("Tidewatch ready at http://{}", server.addr());

    let result = server.run(shutdown_signal()).await;

    info!("Shutting down...");
    ctx.shutdown().await;
    result
}

/// Resolves on Ctrl-C or SIGTERM; `docker stop` and the delegate updater stop
/// the container with SIGTERM. Listeners are installed before this returns.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C"),
                Err(e) => {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match terminate {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM");
                }
                Err(e) => {
                    warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let signal = shutdown_signal();
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -TERM {}", std::process::id()))
            .status()
            .await
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), signal)
            .await
            .expect("SIGTERM did not resolve the shutdown signal");
    }
}

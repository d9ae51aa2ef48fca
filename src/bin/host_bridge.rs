//! Headless host bridge binary for the stdin/stdout control protocol (C14).
//!
//! Loads YAML configuration from the path given as the first CLI argument
//! (`voxcore.yaml` if omitted), builds the [`voxcore::Lifecycle`], and drives
//! [`voxcore::host::stdio::run_stdio_bridge`] until stdin closes or a
//! shutdown signal arrives.
//!
//! All tracing/diagnostic output goes to a rolling file under
//! `app.log_dir`; stdout is reserved exclusively for the `EVENT: `/
//! `STATUS: `/`response:` JSON protocol (§6.1).

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use voxcore::config::CoreConfig;
use voxcore::lifecycle::Lifecycle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("voxcore.yaml"));

    let config = match CoreConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) if !config_path.exists() => {
            eprintln!("voxcore-host: no config at {}, using defaults: {e}", config_path.display());
            CoreConfig::default()
        }
        Err(e) => {
            eprintln!("voxcore-host: fatal config error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_tracing(&config);
    tracing::info!("voxcore-host starting");

    let lifecycle = match Lifecycle::new(config) {
        Ok(lifecycle) => Arc::new(lifecycle),
        Err(e) => {
            tracing::error!(error = %e, "failed to build lifecycle");
            std::process::exit(1);
        }
    };

    if !lifecycle.initialize() {
        tracing::warn!("no audio input device available; hotkey/programmatic triggering only");
    }

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    voxcore::host::stdio::run_stdio_bridge(
        Arc::clone(&lifecycle),
        tokio::io::stdin(),
        tokio::io::stdout(),
        cancel,
    )
    .await;

    lifecycle.cleanup().await;
    tracing::info!("voxcore-host shut down cleanly");
    Ok(())
}

/// Non-blocking rolling file writer under `app.log_dir`, filtered by
/// `app.log_level` (overridable via `RUST_LOG`). Returns the guard that
/// must be kept alive for the writer's background flush thread to run.
fn init_tracing(config: &CoreConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all(&config.app.log_dir);
    let file_appender = tracing_appender::rolling::daily(&config.app.log_dir, "voxcore.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.app.log_level.clone()));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    guard
}

/// Exit codes per §6.1: 0 on graceful stop, 1 on fatal startup error
/// (handled above via `std::process::exit(1)`). SIGINT/SIGTERM both
/// trigger the same graceful `cleanup()` path.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

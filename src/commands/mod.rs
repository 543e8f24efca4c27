pub mod check;
pub mod evict;
pub mod serve;

use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging with the configured filter.
pub(crate) fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(filter))
        .try_init();
}

/// Wait for SIGINT or SIGTERM.
pub(crate) async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use axum_server::tls_rustls::RustlsConfig;
use kube::Client;
use tracing::{info, warn};

use k_rail::config::Config;
use k_rail::exemption;
use k_rail::plugins;
use k_rail::server::{Server, metrics, webhook};

const WEBHOOK_PORT: u16 = 10250;
const METRICS_PORT: u16 = 2112;
const READINESS_PORT: u16 = 8000;

/// How long the readiness endpoint reports Gone before the process exits,
/// so the orchestrator drains traffic first.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(15);

pub async fn run(config_path: &str, exemptions_glob: &str, plugins_glob: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    super::init_logging(config.log_filter());

    let exemptions = if exemptions_glob.is_empty() {
        vec![]
    } else {
        let exemptions = exemption::exemptions_from_glob(exemptions_glob)?;
        info!(count = exemptions.len(), "loaded exemptions");
        exemptions
    };

    let client = Client::try_default()
        .await
        .context("failed to build cluster client")?;

    let plugins = if plugins_glob.is_empty() {
        vec![]
    } else {
        plugins::plugins_from_glob(plugins_glob, &config).await?
    };

    metrics::force_init();

    let tls = config.tls.clone();
    let mut server = Server::new(config, exemptions);
    server.register_builtin_policies(Some(client));
    server.register_plugins(&plugins);
    let server = Arc::new(server);

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .context("failed to load TLS configuration")?;

    info!(cluster = %server.config.cluster_name, "k-rail is running");

    let shutdown_requested = Arc::new(AtomicBool::new(false));

    // webhook endpoint, TLS
    let webhook_addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    let webhook_handle = axum_server::Handle::new();
    let webhook_task = tokio::spawn(
        axum_server::bind_rustls(webhook_addr, rustls_config)
            .handle(webhook_handle.clone())
            .serve(webhook::webhook_router(server.clone()).into_make_service()),
    );

    // metrics endpoint
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], METRICS_PORT));
    let metrics_handle = axum_server::Handle::new();
    let metrics_app = Router::new().route("/metrics", get(metrics::metrics_handler));
    tokio::spawn(
        axum_server::bind(metrics_addr)
            .handle(metrics_handle.clone())
            .serve(metrics_app.into_make_service()),
    );

    // readiness endpoint; flips to Gone once shutdown is requested
    let readiness_addr = SocketAddr::from(([0, 0, 0, 0], READINESS_PORT));
    let readiness_handle = axum_server::Handle::new();
    let readiness_app = Router::new().route(
        "/",
        get({
            let requested = shutdown_requested.clone();
            move || {
                let requested = requested.clone();
                async move {
                    if requested.load(Ordering::Relaxed) {
                        (StatusCode::GONE, "shutting down")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }
            }
        }),
    );
    tokio::spawn(
        axum_server::bind(readiness_addr)
            .handle(readiness_handle.clone())
            .serve(readiness_app.into_make_service()),
    );

    super::wait_for_signal().await?;
    warn!("received termination signal, failing readiness to divert traffic");
    shutdown_requested.store(true, Ordering::Relaxed);
    warn!(
        drain_seconds = SHUTDOWN_DRAIN.as_secs(),
        "draining before shutdown"
    );
    tokio::time::sleep(SHUTDOWN_DRAIN).await;

    plugins::kill_plugins(&plugins).await;
    webhook_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    metrics_handle.shutdown();
    readiness_handle.shutdown();
    webhook_task
        .await
        .context("webhook server task failed")?
        .context("webhook server failed")?;

    info!("k-rail stopped");
    Ok(())
}

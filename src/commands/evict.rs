use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio::sync::broadcast;
use tracing::{error, warn};

use k_rail::evicter::lease::{LeaseLock, RENEW_PERIOD};
use k_rail::evicter::{Controller, PodEvicter};

pub struct EvicterArgs {
    pub kubeconfig: String,
    pub master: String,
    pub label_selector: String,
    pub termination_grace_period: u32,
    pub incubation_period: u64,
    pub lease_lock_name: String,
    pub lease_lock_namespace: String,
    pub probe_listen_address: String,
    pub instance: String,
}

async fn build_client(kubeconfig: &str, master: &str) -> Result<Client> {
    if kubeconfig.is_empty() && master.is_empty() {
        return Client::try_default()
            .await
            .context("failed to build cluster client");
    }

    let mut config = if kubeconfig.is_empty() {
        kube::Config::infer()
            .await
            .context("failed to infer cluster config")?
    } else {
        let contents = Kubeconfig::read_from(kubeconfig)
            .with_context(|| format!("failed to read kubeconfig {kubeconfig}"))?;
        kube::Config::from_custom_kubeconfig(contents, &KubeConfigOptions::default())
            .await
            .context("failed to load kubeconfig")?
    };
    if !master.is_empty() {
        config.cluster_url = master.parse().context("invalid master url")?;
    }

    Client::try_from(config).context("failed to build cluster client")
}

pub async fn run(args: EvicterArgs) -> Result<()> {
    super::init_logging("info");

    let client = build_client(&args.kubeconfig, &args.master).await?;

    // probe endpoints; ready only once this replica holds the lease
    let ready = Arc::new(AtomicBool::new(false));
    let probe_addr: SocketAddr = args
        .probe_listen_address
        .parse()
        .context("invalid probe listen address")?;
    let probe_handle = axum_server::Handle::new();
    let probe_app = Router::new()
        .route("/healthz", get(|| async { (StatusCode::OK, "ok") }))
        .route(
            "/readyz",
            get({
                let ready = ready.clone();
                move || {
                    let ready = ready.clone();
                    async move {
                        if ready.load(Ordering::Relaxed) {
                            (StatusCode::OK, "ok")
                        } else {
                            (StatusCode::SERVICE_UNAVAILABLE, "not leader")
                        }
                    }
                }
            }),
        );
    tokio::spawn(
        axum_server::bind(probe_addr)
            .handle(probe_handle.clone())
            .serve(probe_app.into_make_service()),
    );

    let instance = if args.instance.is_empty() {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "k-rail-evicter".to_string())
    } else {
        args.instance.clone()
    };

    // leader-only: everything below runs while the lease is held
    let lease = Arc::new(LeaseLock::new(
        client.clone(),
        &args.lease_lock_namespace,
        &args.lease_lock_name,
        &instance,
    ));
    lease.acquire().await?;
    ready.store(true, Ordering::Relaxed);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let renew_lease = lease.clone();
    let renew_notify = shutdown_tx.clone();
    let mut renew_shutdown = shutdown_tx.subscribe();
    let renew_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RENEW_PERIOD);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = renew_shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = renew_lease.renew().await {
                        error!(error = %e, "leader lease lost, shutting down");
                        let _ = renew_notify.send(());
                        break;
                    }
                }
            }
        }
    });

    let signal_notify = shutdown_tx.clone();
    tokio::spawn(async move {
        if super::wait_for_signal().await.is_ok() {
            warn!("received termination signal, shutting down");
            let _ = signal_notify.send(());
        }
    });

    let provisioner = PodEvicter::new(
        client.clone(),
        args.termination_grace_period,
        instance.clone(),
    );
    let controller = Controller::new(provisioner, Duration::from_secs(args.incubation_period));

    let result = controller
        .run(client, &args.label_selector, shutdown_tx.subscribe())
        .await;

    let _ = shutdown_tx.send(());
    let _ = renew_task.await;
    lease.release().await;
    probe_handle.shutdown();

    result
}

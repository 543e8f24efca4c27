//! Evicter controller: deletes workloads previously marked tainted once
//! their incubation period has elapsed.
//!
//! A label-selected watch keeps an in-process cache of tainted pods and
//! feeds a work queue keyed `namespace/name`. One worker applies the
//! eviction predicate and calls the eviction subresource; failures retry
//! with backoff up to a bounded number of attempts. A periodic
//! reconciliation re-enqueues every cached key so slow-moving taints are
//! not missed.

pub mod lease;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{Event as CoreEvent, EventSource, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{DeleteParams, EvictParams, PostParams};
use kube::runtime::watcher;
use kube::{Api, Client};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/* ============================= TAINT ANNOTATIONS ============================= */

pub const ANNOTATION_PREVENT_EVICTION: &str = "k-rail/tainted-prevent-eviction";
pub const ANNOTATION_TIMESTAMP: &str = "k-rail/tainted-timestamp";
pub const ANNOTATION_REASON: &str = "k-rail/tainted-reason";
pub const DEFAULT_EVICTION_REASON: &str = "exec";

const MAX_WORKER_RETRIES: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const RECONCILIATION_TICK: Duration = Duration::from_secs(30);
const STARTUP_GRACE_PERIOD: Duration = Duration::from_secs(90);

/* ============================= PREDICATE ============================= */

/// Whether a tainted pod may be evicted now.
///
/// The prevent-eviction annotation (yes/true, case-insensitive) always
/// wins. A well-formed taint timestamp must be at least the incubation
/// period old; a malformed or missing one leaves the pod evictable, the
/// tainted label remains the gate.
pub fn can_evict(pod: &Pod, incubation_period: Duration) -> bool {
    let annotations = pod.metadata.annotations.as_ref();

    if let Some(value) = annotations.and_then(|a| a.get(ANNOTATION_PREVENT_EVICTION))
        && (value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("true"))
    {
        return false;
    }

    if let Some(value) = annotations.and_then(|a| a.get(ANNOTATION_TIMESTAMP))
        && let Ok(tainted_at) = value.parse::<i64>()
    {
        let age_seconds = Utc::now().timestamp() - tainted_at;
        if age_seconds < incubation_period.as_secs() as i64 {
            return false;
        }
    }

    true
}

/* ============================= PROVISIONER ============================= */

/// Seam between the controller loop and the orchestrator's eviction API.
#[async_trait]
pub trait PodProvisioner: Send + Sync {
    async fn evict(&self, pod: &Pod, reason: &str) -> Result<()>;
}

/// Evicts through the pods/eviction subresource, which respects disruption
/// budgets, and records an event carrying the taint reason.
pub struct PodEvicter {
    client: Client,
    grace_period_seconds: u32,
    instance: String,
}

impl PodEvicter {
    pub fn new(client: Client, grace_period_seconds: u32, instance: String) -> Self {
        Self {
            client,
            grace_period_seconds,
            instance,
        }
    }

    async fn record_eviction_event(&self, pod: &Pod, reason: &str, namespace: &str, name: &str) {
        let events: Api<CoreEvent> = Api::namespaced(self.client.clone(), namespace);
        let now = Time(Utc::now());
        let event = CoreEvent {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                generate_name: Some("k-rail-evicter-".to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: pod.metadata.uid.clone(),
                ..Default::default()
            },
            reason: Some("Tainted".to_string()),
            message: Some(reason.to_string()),
            type_: Some("Normal".to_string()),
            count: Some(1),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            source: Some(EventSource {
                component: Some("k-rail-evicter".to_string()),
                ..Default::default()
            }),
            reporting_component: Some("k-rail-evicter".to_string()),
            reporting_instance: Some(self.instance.clone()),
            ..Default::default()
        };
        if let Err(e) = events.create(&PostParams::default(), &event).await {
            warn!(pod = %format!("{namespace}/{name}"), error = %e, "failed to record eviction event");
        }
    }
}

#[async_trait]
impl PodProvisioner for PodEvicter {
    async fn evict(&self, pod: &Pod, reason: &str) -> Result<()> {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        let name = pod
            .metadata
            .name
            .as_deref()
            .context("pod has no name")?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: Some(self.grace_period_seconds),
                ..Default::default()
            }),
            post_options: PostParams::default(),
        };
        pods.evict(name, &params)
            .await
            .with_context(|| format!("failed to evict {namespace}/{name}"))?;

        self.record_eviction_event(pod, reason, namespace, name).await;
        Ok(())
    }
}

/* ============================= CONTROLLER ============================= */

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default(),
    )
}

fn retry_delay(attempt: u32) -> Duration {
    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1));
    delay.min(MAX_RETRY_DELAY)
}

pub struct Controller<P> {
    store: Arc<Mutex<HashMap<String, Pod>>>,
    provisioner: P,
    incubation_period: Duration,
}

impl<P: PodProvisioner> Controller<P> {
    pub fn new(provisioner: P, incubation_period: Duration) -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            provisioner,
            incubation_period,
        }
    }

    /// Business logic for one queue key: look the pod up in the cache,
    /// apply the predicate, evict.
    async fn process_key(&self, key: &str) -> Result<()> {
        let pod = {
            let store = self.store.lock().expect("store lock poisoned");
            store.get(key).cloned()
        };
        let Some(pod) = pod else {
            // deleted since being enqueued
            return Ok(());
        };

        if !can_evict(&pod, self.incubation_period) {
            return Ok(());
        }

        let reason = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_REASON))
            .filter(|r| !r.is_empty())
            .map(String::as_str)
            .unwrap_or(DEFAULT_EVICTION_REASON);

        self.provisioner.evict(&pod, reason).await?;
        info!(pod = %key, reason = %reason, "evicted tainted pod");
        Ok(())
    }

    fn handle_watch_event(
        &self,
        event: watcher::Event<Pod>,
        relist: &mut Option<HashMap<String, Pod>>,
        queue: &mpsc::UnboundedSender<String>,
    ) {
        match event {
            watcher::Event::Init => {
                *relist = Some(HashMap::new());
            }
            watcher::Event::InitApply(pod) => {
                let key = pod_key(&pod);
                if let Some(buffer) = relist.as_mut() {
                    buffer.insert(key.clone(), pod.clone());
                }
                self.store
                    .lock()
                    .expect("store lock poisoned")
                    .insert(key.clone(), pod);
                let _ = queue.send(key);
            }
            watcher::Event::InitDone => {
                // swap in the relisted state so dropped pods disappear
                if let Some(buffer) = relist.take() {
                    *self.store.lock().expect("store lock poisoned") = buffer;
                }
            }
            watcher::Event::Apply(pod) => {
                let key = pod_key(&pod);
                self.store
                    .lock()
                    .expect("store lock poisoned")
                    .insert(key.clone(), pod);
                let _ = queue.send(key);
            }
            watcher::Event::Delete(pod) => {
                let key = pod_key(&pod);
                self.store
                    .lock()
                    .expect("store lock poisoned")
                    .remove(&key);
                let _ = queue.send(key);
            }
        }
    }

    async fn work(
        &self,
        key: String,
        retries: &mut HashMap<String, u32>,
        queue: &mpsc::UnboundedSender<String>,
    ) {
        match self.process_key(&key).await {
            Ok(()) => {
                retries.remove(&key);
            }
            Err(e) => {
                let attempts = retries.entry(key.clone()).or_insert(0);
                *attempts += 1;
                if *attempts <= MAX_WORKER_RETRIES {
                    warn!(pod = %key, error = %e, attempt = *attempts, "error syncing pod, requeueing");
                    let delay = retry_delay(*attempts);
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = queue.send(key);
                    });
                } else {
                    retries.remove(&key);
                    error!(pod = %key, error = %e, "dropping pod out of the queue");
                }
            }
        }
    }

    fn reconcile_all(&self, queue: &mpsc::UnboundedSender<String>) {
        info!("reconciliation started");
        let keys: Vec<String> = {
            let store = self.store.lock().expect("store lock poisoned");
            store.keys().cloned().collect()
        };
        for key in keys {
            let _ = queue.send(key);
        }
        info!("reconciliation completed");
    }

    /// Run the watch/queue/reconcile loop until shutdown or watch failure.
    pub async fn run(
        &self,
        client: Client,
        label_selector: &str,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::all(client);
        let watch_config = watcher::Config::default().labels(label_selector);
        let mut stream = std::pin::pin!(watcher(pods, watch_config));

        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<String>();
        let mut retries: HashMap<String, u32> = HashMap::new();
        let mut relist: Option<HashMap<String, Pod>> = None;
        let started = tokio::time::Instant::now();
        let mut reconcile = tokio::time::interval(RECONCILIATION_TICK);

        info!(label_selector = %label_selector, "starting pod controller");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("stopping pod controller");
                    break;
                }
                event = stream.try_next() => {
                    let Some(event) = event.context("pod watch stream failed")? else {
                        warn!("pod watch stream ended");
                        break;
                    };
                    self.handle_watch_event(event, &mut relist, &queue_tx);
                }
                Some(key) = queue_rx.recv() => {
                    self.work(key, &mut retries, &queue_tx).await;
                }
                _ = reconcile.tick() => {
                    if started.elapsed() >= STARTUP_GRACE_PERIOD {
                        self.reconcile_all(&queue_tx);
                    }
                }
            }
        }

        Ok(())
    }
}

/* ============================= TESTS ============================= */

use std::sync::LazyLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};

/* ============================= PROMETHEUS ============================= */

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static TOTAL_REGISTERED_POLICIES: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new(
        "krail_total_registered_policies",
        "Total policies registered",
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

pub static TOTAL_LOADED_PLUGINS: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("krail_total_loaded_plugins", "Total plugins loaded")
        .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

pub static POLICY_VIOLATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("krail_policy_violations", "Count of policy violations"),
        &["kind", "resource", "namespace", "policy", "user", "enforced"],
    )
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("metric not yet registered");
    c
});

pub static REVIEW_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "krail_review_duration_seconds",
        "Duration of admission review processing in seconds",
    ))
    .expect("metric definition is valid");
    REGISTRY
        .register(Box::new(h.clone()))
        .expect("metric not yet registered");
    h
});

/// Force-init the statics so every series is present on /metrics from the
/// first scrape.
pub fn force_init() {
    LazyLock::force(&TOTAL_REGISTERED_POLICIES);
    LazyLock::force(&TOTAL_LOADED_PLUGINS);
    LazyLock::force(&POLICY_VIOLATIONS);
    LazyLock::force(&REVIEW_DURATION);
}

/* ============================= HANDLER ============================= */

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics encoding error".to_string(),
            ),
        },
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics encoding error".to_string(),
        ),
    }
}

/* ============================= TESTS ============================= */

//! HTTP transport for the validating/mutating webhook.

use std::sync::Arc;
use std::time::Duration;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use kube::core::DynamicObject;
use kube::core::TypeMeta;
use kube::core::admission::AdmissionReview;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, warn};

use super::metrics;
use super::review::ReviewVerdict;
use crate::server::Server;

/// Review bodies are bounded; anything larger is rejected before parsing.
pub const MAX_REVIEW_BODY_BYTES: usize = 1024 * 1024;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REVIEW_API_VERSION: &str = "admission.k8s.io/v1";

/* ============================= ROUTER ============================= */

pub fn webhook_router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/", post(validating_webhook))
        .layer(TimeoutLayer::new(HTTP_TIMEOUT))
        .with_state(server)
}

/* ============================= HANDLER ============================= */

async fn validating_webhook(State(server): State<Arc<Server>>, request: Request) -> Response {
    let _timer = metrics::REVIEW_DURATION.start_timer();

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type != "application/json" {
        error!(content_type = %content_type, "wrong content type, expect application/json");
        return admission_error(StatusCode::BAD_REQUEST, "incorrect content type");
    }

    let body = match to_bytes(request.into_body(), MAX_REVIEW_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "error reading body");
            return admission_error(StatusCode::BAD_REQUEST, "error reading body");
        }
    };

    if server.config.log_filter() == "debug" {
        debug!(body = %String::from_utf8_lossy(&body), "admission review body");
    }

    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "error unmarshalling review request");
            return admission_error(
                StatusCode::BAD_REQUEST,
                format!("error unmarshalling review request: {e}"),
            );
        }
    };

    let types = review.types.clone();
    let Some(admission_request) = review.request else {
        warn!("got empty AdmissionRequest in AdmissionReview");
        let errored = ReviewVerdict {
            uid: String::new(),
            allowed: true,
            reason: "k-rail admission review".to_string(),
            message: "errored while processing review".to_string(),
            patches: vec![],
        };
        return (StatusCode::OK, Json(render_review(&types, &errored))).into_response();
    };

    let verdict = server.review(&admission_request).await;
    (StatusCode::OK, Json(render_review(&types, &verdict))).into_response()
}

/* ============================= ENVELOPES ============================= */

/// Render the outbound review envelope. The patch rides as base64 JSON-Patch
/// with `patchType: "JSONPatch"`, and only on allowed responses.
fn render_review(types: &TypeMeta, verdict: &ReviewVerdict) -> serde_json::Value {
    let api_version = if types.api_version.is_empty() {
        DEFAULT_REVIEW_API_VERSION
    } else {
        &types.api_version
    };

    let mut response = serde_json::json!({
        "uid": verdict.uid,
        "allowed": verdict.allowed,
        "status": {
            "reason": verdict.reason,
            "message": verdict.message,
        },
    });

    if verdict.allowed && !verdict.patches.is_empty() {
        // serialization of a plain op/path/value list cannot fail
        let raw = serde_json::to_vec(&verdict.patches).unwrap_or_default();
        response["patch"] = serde_json::Value::String(BASE64.encode(raw));
        response["patchType"] = serde_json::Value::String("JSONPatch".to_string());
    }

    serde_json::json!({
        "apiVersion": api_version,
        "kind": "AdmissionReview",
        "response": response,
    })
}

fn admission_error(status: StatusCode, message: impl Into<String>) -> Response {
    let envelope = serde_json::json!({
        "apiVersion": DEFAULT_REVIEW_API_VERSION,
        "kind": "AdmissionReview",
        "response": {
            "uid": "",
            "allowed": false,
            "status": {"message": message.into()},
        },
    });
    (status, Json(envelope)).into_response()
}

/* ============================= TESTS ============================= */

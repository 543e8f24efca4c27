//! Policy contract and the built-in policy catalog.

pub mod custom_resource_definition;
pub mod ingress;
pub mod persistent_volume;
pub mod pod;
pub mod pod_disruption_budget;
pub mod rbac;
pub mod service;
pub mod virtual_service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

/* ============================= VERDICT TYPES ============================= */

/// A single detected violation, carrying everything needed to report it,
/// count it, and check it against exemptions.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub resource_name: String,
    pub resource_kind: String,
    pub namespace: String,
    pub violation: String,
    pub policy: String,
    pub error: Option<String>,
}

impl Violation {
    pub fn human_string(&self) -> String {
        format!(
            "{} {} had violation: {}",
            self.resource_kind, self.resource_name, self.violation
        )
    }
}

/// A JSON-Patch operation (RFC 6902). The accumulated list is what the
/// orchestrator applies to the stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.into(),
            value: Some(value),
        }
    }
}

/// What a policy returns: zero or more violations plus zero or more
/// mutation patches.
pub type Verdict = (Vec<Violation>, Vec<PatchOperation>);

/* ============================= CONTRACT ============================= */

/// A policy is a stable name plus a validate operation. Policies are
/// stateless across calls; the ones that query the cluster hold a client
/// handle but no per-request state.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Stable name used for configuration, exemptions, logging and metrics.
    fn name(&self) -> &str;

    /// Detect violations and propose mutations for one request. Violations
    /// block the resource unless exempted; patches merge in registration
    /// order.
    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict;
}

/// Shorthand for building a violation against a view's subject.
pub(crate) fn violation(
    policy: &dyn Policy,
    req: &ReviewRequest<'_>,
    resource_name: &str,
    resource_kind: &str,
    text: impl Into<String>,
) -> Violation {
    Violation {
        resource_name: resource_name.to_string(),
        resource_kind: resource_kind.to_string(),
        namespace: req.namespace().to_string(),
        violation: text.into(),
        policy: policy.name().to_string(),
        error: None,
    }
}

/* ============================= TESTS ============================= */

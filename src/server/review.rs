//! The admission pipeline engine.

use std::time::Duration;

use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use tracing::{info, warn};

use super::{Server, metrics};
use crate::exemption::is_exempt;
use crate::policies::{PatchOperation, Violation};
use crate::resource::ReviewRequest;

/// Budget for evaluating every policy of one request. A pipeline that
/// crosses it replies with a best-effort allow; the orchestrator's webhook
/// failurePolicy decides what that means protocol-side.
pub const REVIEW_TIMEOUT: Duration = Duration::from_secs(5);

const REVIEW_REASON: &str = "k-rail admission review";

/* ============================= VERDICT ============================= */

/// The engine's result for one request, independent of the wire envelope.
#[derive(Debug, Clone)]
pub struct ReviewVerdict {
    pub uid: String,
    pub allowed: bool,
    pub reason: String,
    pub message: String,
    pub patches: Vec<PatchOperation>,
}

impl ReviewVerdict {
    fn allow(uid: &str, message: impl Into<String>) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: true,
            reason: REVIEW_REASON.to_string(),
            message: message.into(),
            patches: vec![],
        }
    }
}

#[derive(Default)]
struct Partitioned {
    enforced: Vec<Violation>,
    reported: Vec<Violation>,
    exempt: Vec<Violation>,
    patches: Vec<PatchOperation>,
}

/* ============================= ENGINE ============================= */

impl Server {
    /// Evaluate one admission request against the registry.
    pub async fn review(&self, ar: &AdmissionRequest<DynamicObject>) -> ReviewVerdict {
        let namespace = ar.namespace.as_deref().unwrap_or("");
        if self
            .config
            .blacklisted_namespaces
            .iter()
            .any(|ns| ns == namespace)
        {
            return ReviewVerdict::allow(&ar.uid, "blacklisted namespace");
        }

        let req = ReviewRequest::new(ar);
        let outcome = match tokio::time::timeout(REVIEW_TIMEOUT, self.run_policies(&req)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(uid = %ar.uid, namespace = %namespace, "review deadline exceeded");
                return ReviewVerdict::allow(
                    &ar.uid,
                    "deadline exceeded, request allowed without complete policy evaluation",
                );
            }
        };

        self.observe(ar, &outcome);
        self.synthesize(ar, outcome)
    }

    async fn run_policies(&self, req: &ReviewRequest<'_>) -> Partitioned {
        let mut outcome = Partitioned::default();

        for policy in &self.enforced_policies {
            let (violations, patches) = policy
                .validate(&self.config.policy_config, req)
                .await;
            let subject = subject_name(req, &violations);
            let exempt = is_exempt(
                &subject,
                req.namespace(),
                &req.admission.user_info,
                policy.name(),
                &self.exemptions,
            );

            if violations.is_empty() {
                // mutations only apply to pod-shaped, non-exempt subjects;
                // exempt workloads must not be silently rewritten
                if !patches.is_empty() && req.pod().is_some() && !exempt {
                    outcome.patches.extend(patches);
                }
            } else if exempt {
                outcome.exempt.extend(violations);
            } else {
                outcome.enforced.extend(violations);
            }
        }

        for policy in &self.report_only_policies {
            let (violations, _patches) = policy
                .validate(&self.config.policy_config, req)
                .await;
            if violations.is_empty() {
                continue;
            }
            let subject = subject_name(req, &violations);
            if is_exempt(
                &subject,
                req.namespace(),
                &req.admission.user_info,
                policy.name(),
                &self.exemptions,
            ) {
                outcome.exempt.extend(violations);
            } else {
                outcome.reported.extend(violations);
            }
        }

        outcome
    }

    /// Log every violation with its enforcement outcome and feed the
    /// violation counter when metrics are enabled.
    fn observe(&self, ar: &AdmissionRequest<DynamicObject>, outcome: &Partitioned) {
        let user = ar.user_info.username.as_deref().unwrap_or("");
        let enforcing = !self.config.global_report_only;

        for v in &outcome.exempt {
            info!(
                kind = %v.resource_kind,
                resource = %v.resource_name,
                namespace = %v.namespace,
                policy = %v.policy,
                user = %user,
                enforced = false,
                "EXEMPT"
            );
            self.count_violation(v, user, false);
        }
        for v in &outcome.reported {
            info!(
                kind = %v.resource_kind,
                resource = %v.resource_name,
                namespace = %v.namespace,
                policy = %v.policy,
                user = %user,
                enforced = false,
                "NOT ENFORCED"
            );
            self.count_violation(v, user, false);
        }
        for v in &outcome.enforced {
            if enforcing {
                warn!(
                    kind = %v.resource_kind,
                    resource = %v.resource_name,
                    namespace = %v.namespace,
                    policy = %v.policy,
                    user = %user,
                    enforced = true,
                    "ENFORCED"
                );
            } else {
                info!(
                    kind = %v.resource_kind,
                    resource = %v.resource_name,
                    namespace = %v.namespace,
                    policy = %v.policy,
                    user = %user,
                    enforced = false,
                    "NOT ENFORCED"
                );
            }
            self.count_violation(v, user, enforcing);
        }
    }

    fn count_violation(&self, v: &Violation, user: &str, enforced: bool) {
        if !self.config.global_metrics_enabled {
            return;
        }
        metrics::POLICY_VIOLATIONS
            .with_label_values(&[
                v.resource_kind.as_str(),
                v.resource_name.as_str(),
                v.namespace.as_str(),
                v.policy.as_str(),
                user,
                if enforced { "true" } else { "false" },
            ])
            .inc();
    }

    fn synthesize(&self, ar: &AdmissionRequest<DynamicObject>, outcome: Partitioned) -> ReviewVerdict {
        if !outcome.enforced.is_empty() && !self.config.global_report_only {
            let message: String = outcome
                .enforced
                .iter()
                .map(|v| format!("\n{}", v.human_string()))
                .collect();
            return ReviewVerdict {
                uid: ar.uid.clone(),
                allowed: false,
                reason: REVIEW_REASON.to_string(),
                message,
                patches: vec![],
            };
        }

        let reported: String = outcome
            .reported
            .iter()
            .map(|v| format!("\n{}", v.human_string()))
            .collect();
        let message = if reported.is_empty() {
            "NO VIOLATIONS".to_string()
        } else {
            format!("NOT ENFORCED:\n{reported}")
        };

        ReviewVerdict {
            uid: ar.uid.clone(),
            allowed: true,
            reason: REVIEW_REASON.to_string(),
            message,
            patches: outcome.patches,
        }
    }
}

/// Subject name used for exemption lookup: the pod view's derived name when
/// the request is pod-shaped, else the first violation's resource name, else
/// the name on the request itself.
fn subject_name(req: &ReviewRequest<'_>, violations: &[Violation]) -> String {
    if let Some(pod) = req.pod()
        && !pod.resource_name.is_empty()
    {
        return pod.resource_name.clone();
    }
    if let Some(first) = violations.first()
        && !first.resource_name.is_empty()
    {
        return first.resource_name.clone();
    }
    req.admission.name.clone()
}

/* ============================= TESTS ============================= */

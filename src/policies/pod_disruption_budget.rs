//! Policy over PodDisruptionBudget resources.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, error};

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

/// A workload matched by the budget's selector.
#[derive(Debug, Clone, PartialEq)]
struct MatchedWorkload {
    name: String,
    kind: &'static str,
    replicas: i32,
}

/// A PDB that cannot ever allow a disruption defeats node drains and
/// autoscaling. Flags budgets whose minAvailable covers every replica of a
/// matched workload, and budgets that pin maxUnavailable to zero.
pub struct PolicyInvalidPodDisruptionBudget {
    client: Option<Client>,
}

impl PolicyInvalidPodDisruptionBudget {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }

    async fn matching_workloads(
        &self,
        client: &Client,
        namespace: &str,
        selector: &LabelSelector,
    ) -> kube::Result<Vec<MatchedWorkload>> {
        let label_selector = selector_string(selector);
        let params = ListParams::default().labels(&label_selector);
        let mut matched = vec![];

        let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
        for item in deployments.list(&params).await?.items {
            matched.push(MatchedWorkload {
                name: item.metadata.name.unwrap_or_default(),
                kind: "Deployment",
                replicas: item.spec.and_then(|s| s.replicas).unwrap_or(1),
            });
        }

        let replica_sets: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
        for item in replica_sets.list(&params).await?.items {
            matched.push(MatchedWorkload {
                name: item.metadata.name.unwrap_or_default(),
                kind: "ReplicaSet",
                replicas: item.spec.and_then(|s| s.replicas).unwrap_or(1),
            });
        }

        let stateful_sets: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
        for item in stateful_sets.list(&params).await?.items {
            matched.push(MatchedWorkload {
                name: item.metadata.name.unwrap_or_default(),
                kind: "StatefulSet",
                replicas: item.spec.and_then(|s| s.replicas).unwrap_or(1),
            });
        }

        Ok(matched)
    }
}

fn selector_string(selector: &LabelSelector) -> String {
    selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether a minAvailable value leaves no eviction headroom for a workload.
fn min_available_blocks(min_available: &IntOrString, replicas: i32) -> bool {
    match min_available {
        IntOrString::Int(n) => *n >= replicas,
        IntOrString::String(percent) => percent.trim_end_matches('%').parse::<u32>().ok()
            .is_some_and(|p| p >= 100),
    }
}

/// Whether a maxUnavailable value forbids every disruption outright.
fn max_unavailable_blocks(max_unavailable: &IntOrString) -> bool {
    match max_unavailable {
        IntOrString::Int(n) => *n == 0,
        IntOrString::String(percent) => {
            percent.trim_end_matches('%').parse::<u32>().ok() == Some(0)
        }
    }
}

#[async_trait]
impl Policy for PolicyInvalidPodDisruptionBudget {
    fn name(&self) -> &str {
        "invalid_pod_disruption_budget"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.pod_disruption_budget() else {
            return (vec![], vec![]);
        };
        let Some(spec) = view.pod_disruption_budget.spec.as_ref() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];

        if let Some(max_unavailable) = &spec.max_unavailable
            && max_unavailable_blocks(max_unavailable)
        {
            violations.push(violation(
                self,
                req,
                &view.resource_name,
                view.resource_kind,
                "Invalid Pod Disruption Budget: maxUnavailable of 0 never allows evictions",
            ));
        }

        if let Some(min_available) = &spec.min_available {
            let Some(client) = &self.client else {
                debug!(policy = self.name(), "no cluster client, skipping");
                return (violations, vec![]);
            };
            let Some(selector) = &spec.selector else {
                return (violations, vec![]);
            };

            let workloads = match self
                .matching_workloads(client, req.namespace(), selector)
                .await
            {
                Ok(workloads) => workloads,
                Err(e) => {
                    error!(policy = self.name(), error = %e, "workload list failed");
                    return (violations, vec![]);
                }
            };

            for workload in workloads {
                if min_available_blocks(min_available, workload.replicas) {
                    violations.push(violation(
                        self,
                        req,
                        &view.resource_name,
                        view.resource_kind,
                        format!(
                            "Invalid Pod Disruption Budget: minAvailable leaves no eviction headroom for {} {} ({} replicas)",
                            workload.kind, workload.name, workload.replicas
                        ),
                    ));
                }
            }
        }

        (violations, vec![])
    }
}

/* ============================= TESTS ============================= */

//! Policies over Service resources.

use async_trait::async_trait;

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

const LOAD_BALANCER_TYPE_ANNOTATION: &str = "cloud.google.com/load-balancer-type";

/* ============================= EXTERNAL IP ============================= */

pub struct PolicyServiceNoExternalIp;

#[async_trait]
impl Policy for PolicyServiceNoExternalIp {
    fn name(&self) -> &str {
        "service_no_external_ip"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.service() else {
            return (vec![], vec![]);
        };

        let has_external_ips = view
            .service
            .spec
            .as_ref()
            .and_then(|s| s.external_ips.as_ref())
            .is_some_and(|ips| !ips.is_empty());

        let mut violations = vec![];
        if has_external_ips {
            violations.push(violation(
                self,
                req,
                &view.resource_name,
                view.resource_kind,
                "Services cannot have External IPs provided due to CVE-2020-8554",
            ));
        }
        (violations, vec![])
    }
}

/* ============================= LOADBALANCER TYPE ============================= */

/// Only the configured load-balancer types may be provisioned without an
/// exemption. The policy is inert until types are configured.
pub struct PolicyRequireServiceLoadbalancerExemption;

#[async_trait]
impl Policy for PolicyRequireServiceLoadbalancerExemption {
    fn name(&self) -> &str {
        "service_require_loadbalancer_exemption"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.service() else {
            return (vec![], vec![]);
        };
        if config.policy_require_service_loadbalancer_types.is_empty() {
            return (vec![], vec![]);
        }

        if let Some(value) = view
            .service
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(LOAD_BALANCER_TYPE_ANNOTATION))
            && config
                .policy_require_service_loadbalancer_types
                .iter()
                .any(|t| t == value)
        {
            return (vec![], vec![]);
        }

        let violations = vec![violation(
            self,
            req,
            &view.resource_name,
            view.resource_kind,
            "Require Service LoadBalancer Exemption: Only specific LoadBalancer Types are allowed",
        )];
        (violations, vec![])
    }
}

/* ============================= TESTS ============================= */

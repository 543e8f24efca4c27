//! Policy over Istio VirtualService resources.

use async_trait::async_trait;

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

/// Only the configured gateways may be referenced without an exemption.
/// Inert until an allowlist is configured.
pub struct PolicyRequireVirtualServiceGateway;

#[async_trait]
impl Policy for PolicyRequireVirtualServiceGateway {
    fn name(&self) -> &str {
        "virtual_service_require_gateway_exemption"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.virtual_service() else {
            return (vec![], vec![]);
        };
        let Some(gateway_config) = &config.policy_require_virtualservice_gateways else {
            return (vec![], vec![]);
        };
        if gateway_config.allowed_gateways.is_empty() {
            return (vec![], vec![]);
        }

        let allowed = gateway_config.allowed_gateways.join(", ");
        let gateways = &view.virtual_service.spec.gateways;

        let mut violations = vec![];
        if gateways.is_empty() && !gateway_config.allow_empty_gateways {
            violations.push(violation(
                self,
                req,
                &view.resource_name,
                view.resource_kind,
                format!(
                    "VirtualService Gateway not specified: Only the following gateways are allowed {allowed} without an exemption"
                ),
            ));
        }

        for gateway in gateways {
            if !gateway_config.allowed_gateways.contains(gateway) {
                violations.push(violation(
                    self,
                    req,
                    &view.resource_name,
                    view.resource_kind,
                    format!(
                        "Require VirtualService Gateway: Only the following gateways are allowed {allowed}. Gateway value {gateway} is not allowed without an exemption"
                    ),
                ));
            }
        }

        (violations, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VirtualServiceGateways;
    use crate::resource::ReviewRequest;
    use crate::testutil::admission_request;
    use serde_json::json;

    fn vs_request(gateways: serde_json::Value) -> kube::core::admission::AdmissionRequest<kube::core::DynamicObject> {
        admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "networking.istio.io", "version": "v1beta1", "kind": "VirtualService"},
            "resource": {"group": "networking.istio.io", "version": "v1beta1", "resource": "virtualservices"},
            "name": "vs",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {},
            "object": {
                "apiVersion": "networking.istio.io/v1beta1",
                "kind": "VirtualService",
                "metadata": {"name": "vs"},
                "spec": {"hosts": ["app.example.com"], "gateways": gateways}
            }
        }))
    }

    fn gateway_config(allow_empty: bool) -> PolicyConfig {
        PolicyConfig {
            policy_require_virtualservice_gateways: Some(VirtualServiceGateways {
                allowed_gateways: vec!["istio-system/shared".to_string()],
                allow_empty_gateways: allow_empty,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_allowed_gateway_passes() {
        let ar = vs_request(json!(["istio-system/shared"]));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyRequireVirtualServiceGateway
            .validate(&gateway_config(false), &req)
            .await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_unlisted_gateway_flagged() {
        let ar = vs_request(json!(["team/private-gateway"]));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyRequireVirtualServiceGateway
            .validate(&gateway_config(false), &req)
            .await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].violation.contains("team/private-gateway"));
    }

    #[tokio::test]
    async fn test_empty_gateways_flagged_unless_allowed() {
        let ar = vs_request(json!([]));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyRequireVirtualServiceGateway
            .validate(&gateway_config(false), &req)
            .await;
        assert_eq!(violations.len(), 1);

        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyRequireVirtualServiceGateway
            .validate(&gateway_config(true), &req)
            .await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_inert_without_config() {
        let ar = vs_request(json!([]));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyRequireVirtualServiceGateway
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert!(violations.is_empty());
    }
}

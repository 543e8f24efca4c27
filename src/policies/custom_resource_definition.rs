//! Policy over CustomResourceDefinition resources.

use async_trait::async_trait;
use kube::api::ListParams;
use kube::core::{ApiResource, DynamicObject};
use kube::{Api, Client};
use tracing::{debug, error};

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

const PROTECT_ANNOTATION: &str = "k-rail.crd.protect";

/// Blocks deletion of a CRD that still has custom resources, when the CRD
/// opts in via the protect annotation. Deleting such a CRD would cascade
/// into deleting every CR of that type.
pub struct PolicyCrdProtect {
    client: Option<Client>,
}

impl PolicyCrdProtect {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Policy for PolicyCrdProtect {
    fn name(&self) -> &str {
        "crd_protect"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        if req.admission.operation != kube::core::admission::Operation::Delete {
            return (vec![], vec![]);
        }
        let Some(view) = req.custom_resource_definition() else {
            return (vec![], vec![]);
        };

        let protected = view
            .custom_resource_definition
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(PROTECT_ANNOTATION))
            .is_some_and(|v| v == "enabled");
        if !protected {
            return (vec![], vec![]);
        }

        let Some(client) = &self.client else {
            debug!(policy = self.name(), "no cluster client, skipping");
            return (vec![], vec![]);
        };

        let crd = &view.custom_resource_definition;
        for version in &crd.spec.versions {
            let resource = ApiResource {
                group: crd.spec.group.clone(),
                version: version.name.clone(),
                api_version: format!("{}/{}", crd.spec.group, version.name),
                kind: crd.spec.names.kind.clone(),
                plural: crd.spec.names.plural.clone(),
            };
            let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
            let custom_resources = match api.list(&ListParams::default().limit(1)).await {
                Ok(list) => list,
                Err(e) => {
                    error!(policy = self.name(), error = %e, "custom resource list failed");
                    continue;
                }
            };

            if !custom_resources.items.is_empty() {
                let violations = vec![violation(
                    self,
                    req,
                    &view.resource_name,
                    &crd.spec.names.kind,
                    "Can not delete custom resource definition (CRD) while custom resources (CRs) exist",
                )];
                return (violations, vec![]);
            }
        }

        (vec![], vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ReviewRequest;
    use crate::testutil::admission_request;
    use serde_json::json;

    fn crd_delete_request(annotations: serde_json::Value) -> kube::core::admission::AdmissionRequest<DynamicObject> {
        admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "apiextensions.k8s.io", "version": "v1", "kind": "CustomResourceDefinition"},
            "resource": {"group": "apiextensions.k8s.io", "version": "v1", "resource": "customresourcedefinitions"},
            "name": "widgets.example.com",
            "namespace": "",
            "operation": "DELETE",
            "userInfo": {},
            "oldObject": {
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": "widgets.example.com", "annotations": annotations},
                "spec": {
                    "group": "example.com",
                    "scope": "Namespaced",
                    "names": {"plural": "widgets", "singular": "widget", "kind": "Widget"},
                    "versions": [{"name": "v1", "served": true, "storage": true}]
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_unprotected_crd_delete_allowed() {
        let ar = crd_delete_request(json!({}));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyCrdProtect::new(None)
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_protected_crd_skipped_without_client() {
        let ar = crd_delete_request(json!({"k-rail.crd.protect": "enabled"}));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyCrdProtect::new(None)
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_create_operation_ignored() {
        let ar = admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "apiextensions.k8s.io", "version": "v1", "kind": "CustomResourceDefinition"},
            "resource": {"group": "apiextensions.k8s.io", "version": "v1", "resource": "customresourcedefinitions"},
            "name": "widgets.example.com",
            "namespace": "",
            "operation": "CREATE",
            "userInfo": {},
            "object": {
                "apiVersion": "apiextensions.k8s.io/v1",
                "kind": "CustomResourceDefinition",
                "metadata": {"name": "widgets.example.com", "annotations": {"k-rail.crd.protect": "enabled"}},
                "spec": {
                    "group": "example.com",
                    "scope": "Namespaced",
                    "names": {"plural": "widgets", "singular": "widget", "kind": "Widget"},
                    "versions": [{"name": "v1", "served": true, "storage": true}]
                }
            }
        }));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyCrdProtect::new(None)
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert!(violations.is_empty());
    }
}

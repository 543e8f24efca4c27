//! Policies over RBAC bindings.

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::Subject;

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

fn is_anonymous(subject: &Subject) -> bool {
    let name = subject.name.to_lowercase();
    name == "system:anonymous" || name == "system:unauthenticated"
}

/* ============================= ROLE BINDING ============================= */

pub struct PolicyNoAnonymousRoleBinding;

#[async_trait]
impl Policy for PolicyNoAnonymousRoleBinding {
    fn name(&self) -> &str {
        "role_binding_no_anonymous_subject"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.role_binding() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for subject in view.role_binding.subjects.iter().flatten() {
            if is_anonymous(subject) {
                violations.push(violation(
                    self,
                    req,
                    &view.resource_name,
                    view.resource_kind,
                    "No Anonymous Role Binding: Granting permissions to anonymous or unauthenticated subject is forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= CLUSTER ROLE BINDING ============================= */

pub struct PolicyNoAnonymousClusterRoleBinding;

#[async_trait]
impl Policy for PolicyNoAnonymousClusterRoleBinding {
    fn name(&self) -> &str {
        "cluster_role_binding_no_anonymous_subject"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.cluster_role_binding() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for subject in view.cluster_role_binding.subjects.iter().flatten() {
            if is_anonymous(subject) {
                violations.push(violation(
                    self,
                    req,
                    &view.resource_name,
                    view.resource_kind,
                    "No Anonymous Cluster Role Binding: Granting permissions to anonymous subject is forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= TESTS ============================= */

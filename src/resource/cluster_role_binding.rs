use k8s_openapi::api::rbac::v1::ClusterRoleBinding;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct ClusterRoleBindingView {
    pub cluster_role_binding: ClusterRoleBinding,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<ClusterRoleBindingView> {
    let ar = req.admission;
    let gvk = (
        ar.kind.group.as_str(),
        ar.kind.version.as_str(),
        ar.kind.kind.as_str(),
    );
    match gvk {
        ("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding") => {
            let cluster_role_binding: ClusterRoleBinding = decode_as(req.object()?)?;
            let name = resource_name(&cluster_role_binding.metadata);
            Some(ClusterRoleBindingView {
                cluster_role_binding,
                resource_name: name,
                resource_kind: "ClusterRoleBinding",
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::resource::ReviewRequest;
    use crate::testutil::admission_request;
    use serde_json::json;

    #[test]
    fn test_decode_cluster_role_binding() {
        let ar = admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "rbac.authorization.k8s.io", "version": "v1", "kind": "ClusterRoleBinding"},
            "resource": {"group": "rbac.authorization.k8s.io", "version": "v1", "resource": "clusterrolebindings"},
            "name": "crb",
            "namespace": "",
            "operation": "CREATE",
            "userInfo": {},
            "object": {
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": {"name": "crb"},
                "roleRef": {"apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole", "name": "cluster-admin"},
                "subjects": [{"kind": "Group", "name": "system:unauthenticated"}]
            }
        }));
        let req = ReviewRequest::new(&ar);
        let view = req.cluster_role_binding().expect("crb view");
        assert_eq!(view.resource_name, "crb");
    }
}

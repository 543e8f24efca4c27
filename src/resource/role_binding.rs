use k8s_openapi::api::rbac::v1::RoleBinding;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct RoleBindingView {
    pub role_binding: RoleBinding,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<RoleBindingView> {
    let ar = req.admission;
    let gvk = (
        ar.kind.group.as_str(),
        ar.kind.version.as_str(),
        ar.kind.kind.as_str(),
    );
    match gvk {
        ("rbac.authorization.k8s.io", "v1", "RoleBinding") => {
            let role_binding: RoleBinding = decode_as(req.object()?)?;
            let name = resource_name(&role_binding.metadata);
            Some(RoleBindingView {
                role_binding,
                resource_name: name,
                resource_kind: "RoleBinding",
            })
        }
        _ => None,
    }
}

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct CustomResourceDefinitionView {
    pub custom_resource_definition: CustomResourceDefinition,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

/// CRD view. On DELETE the submitted object is absent, so the prior object
/// is decoded instead; deletion protection needs the spec being removed.
pub fn decode(req: &ReviewRequest<'_>) -> Option<CustomResourceDefinitionView> {
    let ar = req.admission;
    if ar.kind.group != "apiextensions.k8s.io" || ar.kind.kind != "CustomResourceDefinition" {
        return None;
    }
    let object = req.object().or_else(|| req.old_object())?;
    let custom_resource_definition: CustomResourceDefinition = decode_as(object)?;
    let name = resource_name(&custom_resource_definition.metadata);
    Some(CustomResourceDefinitionView {
        custom_resource_definition,
        resource_name: name,
        resource_kind: "CustomResourceDefinition",
    })
}

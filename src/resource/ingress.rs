use k8s_openapi::api::networking::v1::Ingress;

use super::{ReviewRequest, decode_as};

/// Ingress view. All three historical apiVersions normalize into the
/// networking/v1 shape; policies only read annotations and rule hosts, which
/// are stable across them.
#[derive(Debug, Clone)]
pub struct IngressView {
    pub ingress: Ingress,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<IngressView> {
    let ar = req.admission;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );
    match gvr {
        ("extensions", "v1beta1", "ingresses")
        | ("networking.k8s.io", "v1beta1", "ingresses")
        | ("networking.k8s.io", "v1", "ingresses") => {
            let ingress: Ingress = decode_as(req.object()?)?;
            let resource_name = ingress.metadata.name.clone().unwrap_or_default();
            Some(IngressView {
                ingress,
                resource_name,
                resource_kind: "Ingress",
            })
        }
        _ => None,
    }
}

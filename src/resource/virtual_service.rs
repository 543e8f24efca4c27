use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;

use super::{ReviewRequest, decode_as};

/* ============================= TYPES ============================= */

/// Istio VirtualService, reduced to the fields policies read. Istio types
/// are not part of k8s-openapi, so this stays a local shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VirtualService {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualServiceSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VirtualServiceView {
    pub virtual_service: VirtualService,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

/* ============================= DECODE ============================= */

pub fn decode(req: &ReviewRequest<'_>) -> Option<VirtualServiceView> {
    let ar = req.admission;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );
    match gvr {
        ("networking.istio.io", "v1alpha3", "virtualservices")
        | ("networking.istio.io", "v1beta1", "virtualservices") => {
            let virtual_service: VirtualService = decode_as(req.object()?)?;
            let resource_name = virtual_service.metadata.name.clone().unwrap_or_default();
            Some(VirtualServiceView {
                virtual_service,
                resource_name,
                resource_kind: "VirtualService",
            })
        }
        _ => None,
    }
}

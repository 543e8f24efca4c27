use k8s_openapi::api::core::v1::Service;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct ServiceView {
    pub service: Service,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<ServiceView> {
    let ar = req.admission;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );
    match gvr {
        ("", "v1", "services") => {
            let service: Service = decode_as(req.object()?)?;
            let name = resource_name(&service.metadata);
            Some(ServiceView {
                service,
                resource_name: name,
                resource_kind: "Service",
            })
        }
        _ => None,
    }
}

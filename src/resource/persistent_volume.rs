use k8s_openapi::api::core::v1::PersistentVolume;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct PersistentVolumeView {
    pub persistent_volume: PersistentVolume,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<PersistentVolumeView> {
    let ar = req.admission;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );
    match gvr {
        ("", "v1", "persistentvolumes") => {
            let persistent_volume: PersistentVolume = decode_as(req.object()?)?;
            let name = resource_name(&persistent_volume.metadata);
            Some(PersistentVolumeView {
                persistent_volume,
                resource_name: name,
                resource_kind: "PersistentVolume",
            })
        }
        _ => None,
    }
}

//! Normalized views over admission payloads.
//!
//! Policies never touch raw object bytes. Each view module decodes the
//! request's object into a single typed shape if and only if the request's
//! group/version/resource (or kind, for subresources) appears in that view's
//! table; any other request, and any decode failure, yields `None`, which a
//! policy reads as "does not apply". The webhook must not deny solely
//! because a newer apiVersion failed strict decoding.

pub mod cluster_role_binding;
pub mod custom_resource_definition;
pub mod ingress;
pub mod persistent_volume;
pub mod pod;
pub mod pod_disruption_budget;
pub mod pod_exec;
pub mod role_binding;
pub mod service;
pub mod virtual_service;

use std::sync::OnceLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde::de::DeserializeOwned;

pub use cluster_role_binding::ClusterRoleBindingView;
pub use custom_resource_definition::CustomResourceDefinitionView;
pub use ingress::IngressView;
pub use persistent_volume::PersistentVolumeView;
pub use pod::PodView;
pub use pod_disruption_budget::PodDisruptionBudgetView;
pub use pod_exec::PodExecView;
pub use role_binding::RoleBindingView;
pub use service::ServiceView;
pub use virtual_service::VirtualServiceView;

/* ============================= RESOURCE NAME ============================= */

/// Best-effort name for a resource: the controller-owner's name first, then
/// the object's own name, then the `name` label.
///
/// The owner name is what operators write exemptions against; it makes a pod
/// `test-pod-abc123-xyz` owned by deployment `test-pod` match an exemption
/// for `test-pod`.
pub fn resource_name(meta: &ObjectMeta) -> String {
    if let Some(owners) = &meta.owner_references {
        for owner in owners {
            if owner.controller == Some(true) && !owner.name.is_empty() {
                return owner.name.clone();
            }
        }
    }

    if let Some(name) = &meta.name
        && !name.is_empty()
    {
        return name.clone();
    }

    if let Some(labels) = &meta.labels
        && let Some(name) = labels.get("name")
    {
        return name.clone();
    }

    String::new()
}

/* ============================= DECODING ============================= */

/// Decode a JSON object into a typed Kubernetes struct. Unknown fields are
/// ignored, which is what lets a single modern struct normalize every
/// apiVersion of the same conceptual kind.
pub(crate) fn decode_as<T: DeserializeOwned>(value: &serde_json::Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

/* ============================= REQUEST CARRIER ============================= */

#[derive(Default)]
struct ViewCache {
    pod: OnceLock<Option<PodView>>,
    pod_exec: OnceLock<Option<PodExecView>>,
    ingress: OnceLock<Option<IngressView>>,
    service: OnceLock<Option<ServiceView>>,
    persistent_volume: OnceLock<Option<PersistentVolumeView>>,
    role_binding: OnceLock<Option<RoleBindingView>>,
    cluster_role_binding: OnceLock<Option<ClusterRoleBindingView>>,
    pod_disruption_budget: OnceLock<Option<PodDisruptionBudgetView>>,
    custom_resource_definition: OnceLock<Option<CustomResourceDefinitionView>>,
    virtual_service: OnceLock<Option<VirtualServiceView>>,
}

/// One admission request plus its per-request view cache.
///
/// The carrier is created when the pipeline begins a review and dropped when
/// the response is written. Each view is decoded at most once; concurrent
/// callers racing on the same view block on a single decode and then observe
/// the same instance.
pub struct ReviewRequest<'a> {
    pub admission: &'a AdmissionRequest<DynamicObject>,
    object: Option<serde_json::Value>,
    old_object: Option<serde_json::Value>,
    cache: ViewCache,
}

impl<'a> ReviewRequest<'a> {
    pub fn new(admission: &'a AdmissionRequest<DynamicObject>) -> Self {
        let object = admission
            .object
            .as_ref()
            .and_then(|o| serde_json::to_value(o).ok());
        let old_object = admission
            .old_object
            .as_ref()
            .and_then(|o| serde_json::to_value(o).ok());
        Self {
            admission,
            object,
            old_object,
            cache: ViewCache::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.admission.namespace.as_deref().unwrap_or("")
    }

    pub fn username(&self) -> &str {
        self.admission.user_info.username.as_deref().unwrap_or("")
    }

    /// The submitted object as JSON, if present (absent on DELETE).
    pub fn object(&self) -> Option<&serde_json::Value> {
        self.object.as_ref()
    }

    /// The prior object as JSON. Populated for UPDATE and DELETE.
    pub fn old_object(&self) -> Option<&serde_json::Value> {
        self.old_object.as_ref()
    }

    pub fn pod(&self) -> Option<&PodView> {
        self.cache.pod.get_or_init(|| pod::decode(self)).as_ref()
    }

    pub fn pod_exec(&self) -> Option<&PodExecView> {
        self.cache
            .pod_exec
            .get_or_init(|| pod_exec::decode(self))
            .as_ref()
    }

    pub fn ingress(&self) -> Option<&IngressView> {
        self.cache
            .ingress
            .get_or_init(|| ingress::decode(self))
            .as_ref()
    }

    pub fn service(&self) -> Option<&ServiceView> {
        self.cache
            .service
            .get_or_init(|| service::decode(self))
            .as_ref()
    }

    pub fn persistent_volume(&self) -> Option<&PersistentVolumeView> {
        self.cache
            .persistent_volume
            .get_or_init(|| persistent_volume::decode(self))
            .as_ref()
    }

    pub fn role_binding(&self) -> Option<&RoleBindingView> {
        self.cache
            .role_binding
            .get_or_init(|| role_binding::decode(self))
            .as_ref()
    }

    pub fn cluster_role_binding(&self) -> Option<&ClusterRoleBindingView> {
        self.cache
            .cluster_role_binding
            .get_or_init(|| cluster_role_binding::decode(self))
            .as_ref()
    }

    pub fn pod_disruption_budget(&self) -> Option<&PodDisruptionBudgetView> {
        self.cache
            .pod_disruption_budget
            .get_or_init(|| pod_disruption_budget::decode(self))
            .as_ref()
    }

    pub fn custom_resource_definition(&self) -> Option<&CustomResourceDefinitionView> {
        self.cache
            .custom_resource_definition
            .get_or_init(|| custom_resource_definition::decode(self))
            .as_ref()
    }

    pub fn virtual_service(&self) -> Option<&VirtualServiceView> {
        self.cache
            .virtual_service
            .get_or_init(|| virtual_service::decode(self))
            .as_ref()
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn meta_with_owner(name: &str, owner: Option<(&str, bool)>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            owner_references: owner.map(|(owner_name, controller)| {
                vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: "ReplicaSet".to_string(),
                    name: owner_name.to_string(),
                    uid: "uid".to_string(),
                    controller: Some(controller),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_name_prefers_controller_owner() {
        let meta = meta_with_owner("test-pod-abc123-xyz", Some(("test-pod-abc123", true)));
        assert_eq!(resource_name(&meta), "test-pod-abc123");
    }

    #[test]
    fn test_resource_name_ignores_non_controller_owner() {
        let meta = meta_with_owner("test-pod-abc123-xyz", Some(("test-pod-abc123", false)));
        assert_eq!(resource_name(&meta), "test-pod-abc123-xyz");
    }

    #[test]
    fn test_resource_name_falls_back_to_own_name() {
        let meta = meta_with_owner("standalone", None);
        assert_eq!(resource_name(&meta), "standalone");
    }

    #[test]
    fn test_resource_name_falls_back_to_name_label() {
        let meta = ObjectMeta {
            labels: Some([("name".to_string(), "labeled".to_string())].into()),
            ..Default::default()
        };
        assert_eq!(resource_name(&meta), "labeled");
    }

    #[test]
    fn test_resource_name_empty_when_nothing_set() {
        assert_eq!(resource_name(&ObjectMeta::default()), "");
    }
}

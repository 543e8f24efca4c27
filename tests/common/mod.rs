use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde_json::json;

/// Build a CREATE admission request for a bare pod.
pub fn pod_admission_request(
    name: &str,
    namespace: &str,
    spec: serde_json::Value,
    groups: &[&str],
) -> AdmissionRequest<DynamicObject> {
    pod_admission_request_with_metadata(
        json!({"name": name}),
        name,
        namespace,
        spec,
        groups,
    )
}

/// Same, with full control over the object metadata (owner references,
/// annotations).
pub fn pod_admission_request_with_metadata(
    metadata: serde_json::Value,
    name: &str,
    namespace: &str,
    spec: serde_json::Value,
    groups: &[&str],
) -> AdmissionRequest<DynamicObject> {
    serde_json::from_value(json!({
        "uid": "integration-uid",
        "kind": {"group": "", "version": "v1", "kind": "Pod"},
        "resource": {"group": "", "version": "v1", "resource": "pods"},
        "name": name,
        "namespace": namespace,
        "operation": "CREATE",
        "userInfo": {"username": "integration-user", "groups": groups},
        "object": {
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": metadata,
            "spec": spec
        }
    }))
    .expect("valid admission request json")
}

//! Policies over PersistentVolume resources.

use async_trait::async_trait;

use super::{Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::ReviewRequest;

pub struct PolicyNoPersistentVolumeHost;

#[async_trait]
impl Policy for PolicyNoPersistentVolumeHost {
    fn name(&self) -> &str {
        "persistent_volume_no_host_path"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(view) = req.persistent_volume() else {
            return (vec![], vec![]);
        };

        let uses_host_path = view
            .persistent_volume
            .spec
            .as_ref()
            .is_some_and(|s| s.host_path.is_some());

        let mut violations = vec![];
        if uses_host_path {
            violations.push(violation(
                self,
                req,
                &view.resource_name,
                view.resource_kind,
                "No Persistent Volume Host Path: Using the host path is forbidden",
            ));
        }
        (violations, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ReviewRequest;
    use crate::testutil::admission_request;
    use serde_json::json;

    fn pv_request(spec: serde_json::Value) -> kube::core::admission::AdmissionRequest<kube::core::DynamicObject> {
        admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "", "version": "v1", "kind": "PersistentVolume"},
            "resource": {"group": "", "version": "v1", "resource": "persistentvolumes"},
            "name": "pv-1",
            "namespace": "",
            "operation": "CREATE",
            "userInfo": {},
            "object": {
                "apiVersion": "v1",
                "kind": "PersistentVolume",
                "metadata": {"name": "pv-1"},
                "spec": spec
            }
        }))
    }

    #[tokio::test]
    async fn test_host_path_pv_flagged() {
        let ar = pv_request(json!({"hostPath": {"path": "/data"}}));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyNoPersistentVolumeHost
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn test_nfs_pv_allowed() {
        let ar = pv_request(json!({"nfs": {"server": "fs.example.com", "path": "/export"}}));
        let req = ReviewRequest::new(&ar);
        let (violations, _) = PolicyNoPersistentVolumeHost
            .validate(&PolicyConfig::default(), &req)
            .await;
        assert!(violations.is_empty());
    }
}

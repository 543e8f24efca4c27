mod common;

use async_trait::async_trait;
use serde_json::json;

use k_rail::config::{Config, EmptyDirSizeLimit, PolicyConfig, PolicySettings};
use k_rail::policies::{PatchOperation, Policy, Verdict};
use k_rail::resource::ReviewRequest;
use k_rail::server::Server;

use common::pod_admission_request;

/* ============================= HELPERS ============================= */

fn enabled(name: &str) -> PolicySettings {
    PolicySettings {
        name: name.to_string(),
        enabled: true,
        report_only: false,
    }
}

fn server_with(config: Config) -> Server {
    let mut server = Server::new(config, vec![]);
    server.register_builtin_policies(None);
    server
}

/* ============================= SCENARIOS ============================= */

// deny by policy, no exemption
#[tokio::test]
async fn test_host_network_pod_denied() {
    let server = server_with(Config {
        policies: vec![enabled("pod_no_host_network")],
        ..Default::default()
    });

    let request = pod_admission_request(
        "bad-pod",
        "default",
        json!({
            "hostNetwork": true,
            "containers": [{"name": "main", "image": "img:1"}]
        }),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(!verdict.allowed);
    assert!(verdict.message.contains("host network"));
    assert_eq!(verdict.uid, "integration-uid");
}

// mutation when clean: emptyDir volume without a sizeLimit gets the default
#[tokio::test]
async fn test_empty_dir_default_mutation() {
    let server = server_with(Config {
        policies: vec![enabled("pod_empty_dir_size_limit")],
        policy_config: PolicyConfig {
            policy_empty_dir_size_limit: EmptyDirSizeLimit {
                default: "1".to_string(),
                max: "10".to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    });

    let request = pod_admission_request(
        "scratch-pod",
        "default",
        json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {}}]
        }),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(verdict.allowed);
    assert_eq!(verdict.patches.len(), 1);
    let patch = &verdict.patches[0];
    assert_eq!(patch.op, "replace");
    assert_eq!(patch.path, "/spec/volumes/0/emptyDir/sizeLimit");
    assert_eq!(patch.value.as_ref().unwrap(), &json!("1"));

    // the serialized patch list is a valid JSON-Patch document
    let raw = serde_json::to_vec(&verdict.patches).unwrap();
    let parsed: json_patch::Patch = serde_json::from_slice(&raw).unwrap();
    assert_eq!(parsed.0.len(), 1);
}

// report-only elevation via global_report_only
#[tokio::test]
async fn test_global_report_only_allows_with_report() {
    let server = server_with(Config {
        policies: vec![enabled("pod_no_host_network")],
        global_report_only: true,
        ..Default::default()
    });

    let request = pod_admission_request(
        "bad-pod",
        "default",
        json!({
            "hostNetwork": true,
            "containers": [{"name": "main", "image": "img:1"}]
        }),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(verdict.allowed);
    assert!(verdict.message.starts_with("NOT ENFORCED:"));
}

// blacklisted namespace short-circuits before any policy runs
#[tokio::test]
async fn test_blacklisted_namespace_allowed() {
    let server = server_with(Config {
        policies: vec![enabled("pod_no_host_network")],
        blacklisted_namespaces: vec!["kube-system".to_string()],
        ..Default::default()
    });

    let request = pod_admission_request(
        "system-pod",
        "kube-system",
        json!({
            "hostNetwork": true,
            "containers": [{"name": "main", "image": "img:1"}]
        }),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(verdict.allowed);
    assert_eq!(verdict.message, "blacklisted namespace");
    assert!(verdict.patches.is_empty());
}

/* ============================= MUTATION ORDER ============================= */

struct FixedPatchPolicy {
    name: &'static str,
    value: &'static str,
}

#[async_trait]
impl Policy for FixedPatchPolicy {
    fn name(&self) -> &str {
        self.name
    }

    async fn validate(&self, _config: &PolicyConfig, _req: &ReviewRequest<'_>) -> Verdict {
        (
            vec![],
            vec![PatchOperation::replace(
                "/metadata/labels/owner",
                self.value.into(),
            )],
        )
    }
}

// two enforced policies replacing the same path merge in registration order
#[tokio::test]
async fn test_mutation_patches_merge_in_registration_order() {
    let mut server = Server::new(
        Config {
            policies: vec![enabled("first_patch"), enabled("second_patch")],
            ..Default::default()
        },
        vec![],
    );
    server.register_policy(Box::new(FixedPatchPolicy {
        name: "first_patch",
        value: "first",
    }));
    server.register_policy(Box::new(FixedPatchPolicy {
        name: "second_patch",
        value: "second",
    }));

    let request = pod_admission_request(
        "ordered-pod",
        "default",
        json!({"containers": [{"name": "main", "image": "img:1"}]}),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(verdict.allowed);
    assert_eq!(verdict.patches.len(), 2);
    assert_eq!(verdict.patches[0].value.as_ref().unwrap(), &json!("first"));
    assert_eq!(verdict.patches[1].value.as_ref().unwrap(), &json!("second"));
}

/* ============================= CLEAN REQUEST ============================= */

#[tokio::test]
async fn test_clean_pod_reports_no_violations() {
    let server = server_with(Config {
        policies: vec![enabled("pod_no_host_network"), enabled("pod_no_host_pid")],
        ..Default::default()
    });

    let request = pod_admission_request(
        "clean-pod",
        "default",
        json!({"containers": [{"name": "main", "image": "img:1"}]}),
        &["group1"],
    );
    let verdict = server.review(&request).await;
    assert!(verdict.allowed);
    assert_eq!(verdict.message, "NO VIOLATIONS");
    assert_eq!(verdict.uid, "integration-uid");
}

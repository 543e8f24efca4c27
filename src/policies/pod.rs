//! Policies over the pod-shaped view.

use std::sync::LazyLock;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Container;
use regex::Regex;

use super::{PatchOperation, Policy, Verdict, violation};
use crate::config::PolicyConfig;
use crate::resource::{PodView, ReviewRequest};

const SAFE_TO_EVICT_ANNOTATION: &str = "cluster-autoscaler.kubernetes.io/safe-to-evict";
const SECCOMP_ANNOTATION: &str = "seccomp.security.alpha.kubernetes.io/pod";
const APPARMOR_ANNOTATION_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io";

fn containers_of(view: &PodView) -> impl Iterator<Item = &Container> {
    view.pod_spec
        .containers
        .iter()
        .chain(view.pod_spec.init_containers.iter().flatten())
}

/* ============================= NO EXEC ============================= */

pub struct PolicyNoExec;

#[async_trait]
impl Policy for PolicyNoExec {
    fn name(&self) -> &str {
        "pod_no_exec"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(exec) = req.pod_exec() else {
            return (vec![], vec![]);
        };

        let violations = vec![violation(
            self,
            req,
            &exec.resource_name,
            exec.resource_kind,
            "No pod exec: Execing into a Pod is forbidden without an exemption",
        )];
        (violations, vec![])
    }
}

/* ============================= BIND MOUNTS ============================= */

pub struct PolicyBindMounts;

#[async_trait]
impl Policy for PolicyBindMounts {
    fn name(&self) -> &str {
        "pod_no_bind_mounts"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for volume in pod.pod_spec.volumes.iter().flatten() {
            if volume.host_path.is_some() {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "Host Bind Mounts: host bind mounts are forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= DOCKER SOCK ============================= */

/// Forbids a hostPath mount for just the Docker socket. It does not block
/// mounting '/', '/var', or '/var/run'; use the bind-mounts policy to block
/// all bind mounts.
pub struct PolicyDockerSock;

#[async_trait]
impl Policy for PolicyDockerSock {
    fn name(&self) -> &str {
        "pod_no_docker_sock"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for volume in pod.pod_spec.volumes.iter().flatten() {
            if let Some(host_path) = &volume.host_path
                && host_path.path == "/var/run/docker.sock"
            {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "Docker Sock Mount: mounting the Docker socket is forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= IMMUTABLE IMAGE REFERENCE ============================= */

static DIGEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sha256:[0-9a-f]{64}$").expect("digest regex is valid"));

pub struct PolicyImageImmutableReference;

#[async_trait]
impl Policy for PolicyImageImmutableReference {
    fn name(&self) -> &str {
        "pod_immutable_reference"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let violation_text = "Immutable Image Reference: image tag must include its sha256 digest";

        let mut violations = vec![];
        for container in containers_of(pod) {
            let image = container.image.as_deref().unwrap_or("");
            let digest = image.rsplit_once('@').map(|(_, digest)| digest);
            let valid = digest.is_some_and(|d| DIGEST_RE.is_match(d));
            if !valid {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    violation_text,
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= NO TILLER ============================= */

pub struct PolicyNoTiller;

#[async_trait]
impl Policy for PolicyNoTiller {
    fn name(&self) -> &str {
        "pod_no_tiller"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for container in containers_of(pod) {
            // could also check for port 44134/tcp
            if container.image.as_deref().unwrap_or("").contains("/tiller") {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "No Tiller: Helm Tiller is forbidden from running",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= TRUSTED REPOSITORY ============================= */

pub struct PolicyTrustedRepository;

#[async_trait]
impl Policy for PolicyTrustedRepository {
    fn name(&self) -> &str {
        "pod_trusted_repository"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for container in containers_of(pod) {
            let image = container.image.as_deref().unwrap_or("");
            let trusted = config
                .policy_trusted_repository_regexes
                .iter()
                .any(|pattern| {
                    Regex::new(pattern)
                        .map(|re| re.is_match(image))
                        .unwrap_or(false)
                });

            if !trusted {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "Trusted Image Repository: image must be sourced from a trusted repository",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= HOST NETWORK ============================= */

pub struct PolicyNoHostNetwork;

#[async_trait]
impl Policy for PolicyNoHostNetwork {
    fn name(&self) -> &str {
        "pod_no_host_network"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        if pod.pod_spec.host_network == Some(true) {
            violations.push(violation(
                self,
                req,
                &pod.resource_name,
                pod.resource_kind,
                "No Host Network: Using the host network is forbidden",
            ));
        }
        (violations, vec![])
    }
}

/* ============================= PRIVILEGED CONTAINER ============================= */

pub struct PolicyNoPrivilegedContainer;

#[async_trait]
impl Policy for PolicyNoPrivilegedContainer {
    fn name(&self) -> &str {
        "pod_no_privileged_container"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for container in containers_of(pod) {
            let privileged = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.privileged)
                == Some(true);
            if privileged {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "No Privileged Container: Running privileged containers is forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= NEW CAPABILITIES ============================= */

pub struct PolicyNoNewCapabilities;

#[async_trait]
impl Policy for PolicyNoNewCapabilities {
    fn name(&self) -> &str {
        "pod_no_new_capabilities"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        for container in containers_of(pod) {
            let added = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.capabilities.as_ref())
                .and_then(|caps| caps.add.as_ref())
                .is_some_and(|add| !add.is_empty());
            if added {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "No New Capabilities: Adding additional capabilities is forbidden",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= HOST PID ============================= */

pub struct PolicyNoHostPid;

#[async_trait]
impl Policy for PolicyNoHostPid {
    fn name(&self) -> &str {
        "pod_no_host_pid"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        if pod.pod_spec.host_pid == Some(true) {
            violations.push(violation(
                self,
                req,
                &pod.resource_name,
                pod.resource_kind,
                "No Host PID: Using the host PID namespace is forbidden",
            ));
        }
        (violations, vec![])
    }
}

/* ============================= SHARE PROCESS NAMESPACE ============================= */

/// Only an explicit `shareProcessNamespace: true` is a violation; `false`
/// states the default and is fine.
pub struct PolicyNoShareProcessNamespace;

#[async_trait]
impl Policy for PolicyNoShareProcessNamespace {
    fn name(&self) -> &str {
        "pod_no_shareprocessnamespace"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        if pod.pod_spec.share_process_namespace == Some(true) {
            violations.push(violation(
                self,
                req,
                &pod.resource_name,
                pod.resource_kind,
                "No ShareProcessNamespace: sharing the process namespace among containers in a Pod is forbidden",
            ));
        }
        (violations, vec![])
    }
}

/* ============================= ROOT USER ============================= */

pub struct PolicyNoRootUser;

#[async_trait]
impl Policy for PolicyNoRootUser {
    fn name(&self) -> &str {
        "pod_no_root_user"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];

        for container in containers_of(pod) {
            let sc = container.security_context.as_ref();
            let non_root = sc.and_then(|sc| sc.run_as_non_root) == Some(true);
            let non_zero_uid = sc.and_then(|sc| sc.run_as_user).is_some_and(|uid| uid > 0);
            if !(non_root || non_zero_uid) {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    format!(
                        "No Root user: Container {} can run as the root user which is forbidden",
                        container.name
                    ),
                ));
            }
        }

        // when every container pins a non-root user and no pod-level context
        // exists there is nothing left to check
        let pod_sc = pod.pod_spec.security_context.as_ref();
        if violations.is_empty() && pod_sc.is_none() {
            return (violations, vec![]);
        }

        let non_root = pod_sc.and_then(|sc| sc.run_as_non_root) == Some(true);
        let non_zero_uid = pod_sc
            .and_then(|sc| sc.run_as_user)
            .is_some_and(|uid| uid > 0);
        if !(non_root || non_zero_uid) {
            violations.push(violation(
                self,
                req,
                &pod.resource_name,
                pod.resource_kind,
                "No Root user: Running as the root user is forbidden",
            ));
        }

        (violations, vec![])
    }
}

/* ============================= UNCONFINED APPARMOR ============================= */

pub struct PolicyDenyUnconfinedApparmor;

#[async_trait]
impl Policy for PolicyDenyUnconfinedApparmor {
    fn name(&self) -> &str {
        "pod_deny_unconfined_apparmor"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let mut violations = vec![];
        if pod.resource_kind == "Pod" {
            for (name, value) in pod.pod_annotations.iter().flatten() {
                if name.starts_with(APPARMOR_ANNOTATION_PREFIX) && value == "unconfined" {
                    violations.push(violation(
                        self,
                        req,
                        &pod.resource_name,
                        pod.resource_kind,
                        "Unconfined AppArmor: Running without an AppArmor profile is forbidden",
                    ));
                }
            }
        }
        (violations, vec![])
    }
}

/* ============================= SAFE TO EVICT ============================= */

pub struct PolicySafeToEvict;

#[async_trait]
impl Policy for PolicySafeToEvict {
    fn name(&self) -> &str {
        "pod_safe_to_evict"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let annotated = pod
            .pod_annotations
            .iter()
            .flatten()
            .any(|(name, value)| name == SAFE_TO_EVICT_ANNOTATION && value == "true");

        let mut violations = vec![];
        for volume in pod.pod_spec.volumes.iter().flatten() {
            if (volume.host_path.is_some() || volume.empty_dir.is_some()) && !annotated {
                violations.push(violation(
                    self,
                    req,
                    &pod.resource_name,
                    pod.resource_kind,
                    "Safe to evict: annotation is required for Pods that use emptyDir or hostPath mounts to enable cluster autoscaling",
                ));
            }
        }
        (violations, vec![])
    }
}

/* ============================= MUTATE SAFE TO EVICT ============================= */

pub struct PolicyMutateSafeToEvict;

#[async_trait]
impl Policy for PolicyMutateSafeToEvict {
    fn name(&self) -> &str {
        "pod_mutate_safe_to_evict"
    }

    async fn validate(&self, _config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };
        if pod.resource_kind != "Pod" {
            return (vec![], vec![]);
        }

        let needs_annotation = pod
            .pod_spec
            .volumes
            .iter()
            .flatten()
            .any(|v| v.host_path.is_some() || v.empty_dir.is_some());
        let already_annotated = pod
            .pod_annotations
            .iter()
            .flatten()
            .any(|(name, _)| name == SAFE_TO_EVICT_ANNOTATION);

        let mut patches = vec![];
        if needs_annotation && !already_annotated {
            patches.push(annotation_patch(pod, SAFE_TO_EVICT_ANNOTATION, "true"));
        }
        (vec![], patches)
    }
}

/// Add or replace a single annotation via JSON-Patch. Without an existing
/// annotations object the whole map is added; otherwise the key is replaced,
/// with `/` escaped as `~1` per RFC 6901.
fn annotation_patch(pod: &PodView, name: &str, value: &str) -> PatchOperation {
    if pod.pod_annotations.is_none() {
        let mut annotations = serde_json::Map::new();
        annotations.insert(name.to_string(), value.into());
        PatchOperation::add("/metadata/annotations", annotations.into())
    } else {
        PatchOperation::replace(
            format!("/metadata/annotations/{}", name.replace('/', "~1")),
            value.into(),
        )
    }
}

/* ============================= DEFAULT SECCOMP ============================= */

pub struct PolicyDefaultSeccompPolicy;

#[async_trait]
impl Policy for PolicyDefaultSeccompPolicy {
    fn name(&self) -> &str {
        "pod_default_seccomp_policy"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };
        if pod.resource_kind != "Pod" {
            return (vec![], vec![]);
        }

        let seccomp_policy = if config.policy_default_seccomp_policy.is_empty() {
            "runtime/default"
        } else {
            &config.policy_default_seccomp_policy
        };

        let already_set = pod
            .pod_annotations
            .iter()
            .flatten()
            .any(|(name, _)| name == SECCOMP_ANNOTATION);

        let mut patches = vec![];
        if !already_set {
            patches.push(annotation_patch(pod, SECCOMP_ANNOTATION, seccomp_policy));
        }
        (vec![], patches)
    }
}

/* ============================= IMAGE PULL POLICY ============================= */

pub struct PolicyImagePullPolicy;

#[async_trait]
impl Policy for PolicyImagePullPolicy {
    fn name(&self) -> &str {
        "pod_image_pull_policy"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };
        if config.policy_image_pull_policy.is_empty() || pod.resource_kind != "Pod" {
            return (vec![], vec![]);
        }

        let mut patches = vec![];
        for (index, container) in pod.pod_spec.init_containers.iter().flatten().enumerate() {
            let path = format!("/spec/initContainers/{index}/imagePullPolicy");
            patches.extend(pull_policy_patch(container, path, config));
        }
        for (index, container) in pod.pod_spec.containers.iter().enumerate() {
            let path = format!("/spec/containers/{index}/imagePullPolicy");
            patches.extend(pull_policy_patch(container, path, config));
        }
        (vec![], patches)
    }
}

fn pull_policy_patch(
    container: &Container,
    path: String,
    config: &PolicyConfig,
) -> Option<PatchOperation> {
    let image = container.image.as_deref().unwrap_or("");
    for (enforced_policy, image_regexes) in &config.policy_image_pull_policy {
        for pattern in image_regexes {
            let matched = Regex::new(pattern)
                .map(|re| re.is_match(image))
                .unwrap_or(false);
            if !matched {
                continue;
            }
            if container.image_pull_policy.as_deref() != Some(enforced_policy) {
                return Some(PatchOperation::replace(
                    path.clone(),
                    enforced_policy.as_str().into(),
                ));
            }
            return None;
        }
    }
    None
}

/* ============================= EMPTY DIR SIZE LIMIT ============================= */

pub struct PolicyEmptyDirSizeLimit;

#[async_trait]
impl Policy for PolicyEmptyDirSizeLimit {
    fn name(&self) -> &str {
        "pod_empty_dir_size_limit"
    }

    async fn validate(&self, config: &PolicyConfig, req: &ReviewRequest<'_>) -> Verdict {
        let Some(pod) = req.pod() else {
            return (vec![], vec![]);
        };

        let limits = &config.policy_empty_dir_size_limit;
        let max = parse_quantity(&limits.max);

        let mut violations = vec![];
        let mut patches = vec![];
        for (index, volume) in pod.pod_spec.volumes.iter().flatten().enumerate() {
            let Some(empty_dir) = &volume.empty_dir else {
                continue;
            };

            let size_limit = empty_dir
                .size_limit
                .as_ref()
                .and_then(|q| parse_quantity(&q.0));
            match size_limit {
                Some(size) if size > 0.0 => {
                    if max.is_some_and(|max| size > max) {
                        violations.push(violation(
                            self,
                            req,
                            &pod.resource_name,
                            pod.resource_kind,
                            "Empty dir size limit: size limit is required for Pods that use emptyDir",
                        ));
                    }
                }
                _ => {
                    if !limits.default.is_empty() {
                        patches.push(PatchOperation::replace(
                            format!("/spec/volumes/{index}/emptyDir/sizeLimit"),
                            limits.default.as_str().into(),
                        ));
                    }
                }
            }
        }
        (violations, patches)
    }
}

/// Parse a Kubernetes quantity string into a comparable magnitude. Only
/// ordering matters here, so everything collapses to f64.
fn parse_quantity(quantity: &str) -> Option<f64> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return None;
    }
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);
    let base: f64 = number.parse().ok()?;
    let multiplier: f64 = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1048576.0,
        "Gi" => 1073741824.0,
        "Ti" => 1099511627776.0,
        "Pi" => 1125899906842624.0,
        "Ei" => 1152921504606846976.0,
        _ => return None,
    };
    Some(base * multiplier)
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ReviewRequest;
    use crate::testutil::admission_request;
    use kube::core::DynamicObject;
    use kube::core::admission::AdmissionRequest;
    use serde_json::json;

    fn pod_request(spec: serde_json::Value) -> AdmissionRequest<DynamicObject> {
        pod_request_with_metadata(json!({"name": "test-pod"}), spec)
    }

    fn pod_request_with_metadata(
        metadata: serde_json::Value,
        spec: serde_json::Value,
    ) -> AdmissionRequest<DynamicObject> {
        admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "name": "test-pod",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {"username": "dev", "groups": ["devs"]},
            "object": {
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": metadata,
                "spec": spec
            }
        }))
    }

    async fn run(policy: &dyn Policy, ar: &AdmissionRequest<DynamicObject>) -> Verdict {
        let req = ReviewRequest::new(ar);
        policy.validate(&PolicyConfig::default(), &req).await
    }

    async fn run_with(
        policy: &dyn Policy,
        config: &PolicyConfig,
        ar: &AdmissionRequest<DynamicObject>,
    ) -> Verdict {
        let req = ReviewRequest::new(ar);
        policy.validate(config, &req).await
    }

    // ── host network ──

    #[tokio::test]
    async fn test_host_network_violation() {
        let ar = pod_request(json!({
            "hostNetwork": true,
            "containers": [{"name": "main", "image": "img:1"}]
        }));
        let (violations, patches) = run(&PolicyNoHostNetwork, &ar).await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].violation.contains("host network"));
        assert!(patches.is_empty());
    }

    #[tokio::test]
    async fn test_host_network_clean() {
        let ar = pod_request(json!({"containers": [{"name": "main", "image": "img:1"}]}));
        let (violations, _) = run(&PolicyNoHostNetwork, &ar).await;
        assert!(violations.is_empty());
    }

    // ── bind mounts / docker sock ──

    #[tokio::test]
    async fn test_bind_mounts_violation_per_volume() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [
                {"name": "a", "hostPath": {"path": "/var"}},
                {"name": "b", "hostPath": {"path": "/etc"}},
                {"name": "c", "emptyDir": {}}
            ]
        }));
        let (violations, _) = run(&PolicyBindMounts, &ar).await;
        assert_eq!(violations.len(), 2);
    }

    #[tokio::test]
    async fn test_docker_sock_only_matches_socket_path() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [
                {"name": "a", "hostPath": {"path": "/var/run"}},
                {"name": "b", "hostPath": {"path": "/var/run/docker.sock"}}
            ]
        }));
        let (violations, _) = run(&PolicyDockerSock, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    // ── immutable reference ──

    #[tokio::test]
    async fn test_immutable_reference_accepts_digest() {
        let digest = "a".repeat(64);
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": format!("gcr.io/repo/img@sha256:{digest}")}]
        }));
        let (violations, _) = run(&PolicyImageImmutableReference, &ar).await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_immutable_reference_rejects_tag_only() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "gcr.io/repo/img:latest"}]
        }));
        let (violations, _) = run(&PolicyImageImmutableReference, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn test_immutable_reference_rejects_bad_digest() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "gcr.io/repo/img@sha256:nothex"}]
        }));
        let (violations, _) = run(&PolicyImageImmutableReference, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    // ── trusted repository ──

    #[tokio::test]
    async fn test_trusted_repository_checks_init_containers_too() {
        let config = PolicyConfig {
            policy_trusted_repository_regexes: vec!["^gcr.io/repo/.*".to_string()],
            ..Default::default()
        };
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "gcr.io/repo/app:1"}],
            "initContainers": [{"name": "init", "image": "docker.io/evil:1"}]
        }));
        let (violations, _) = run_with(&PolicyTrustedRepository, &config, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    // ── share process namespace ──

    #[tokio::test]
    async fn test_share_process_namespace_explicit_true_only() {
        let explicit_true = pod_request(json!({
            "shareProcessNamespace": true,
            "containers": [{"name": "main", "image": "img:1"}]
        }));
        let (violations, _) = run(&PolicyNoShareProcessNamespace, &explicit_true).await;
        assert_eq!(violations.len(), 1);

        let explicit_false = pod_request(json!({
            "shareProcessNamespace": false,
            "containers": [{"name": "main", "image": "img:1"}]
        }));
        let (violations, _) = run(&PolicyNoShareProcessNamespace, &explicit_false).await;
        assert!(violations.is_empty());
    }

    // ── root user ──

    #[tokio::test]
    async fn test_no_root_user_flags_unpinned_container() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}]
        }));
        let (violations, _) = run(&PolicyNoRootUser, &ar).await;
        assert_eq!(violations.len(), 1);
        assert!(violations[0].violation.contains("Container main"));
    }

    #[tokio::test]
    async fn test_no_root_user_allows_non_root_containers() {
        let ar = pod_request(json!({
            "containers": [{
                "name": "main",
                "image": "img:1",
                "securityContext": {"runAsNonRoot": true}
            }]
        }));
        let (violations, _) = run(&PolicyNoRootUser, &ar).await;
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_no_root_user_pod_context_checked_when_set() {
        let ar = pod_request(json!({
            "securityContext": {"runAsUser": 0},
            "containers": [{
                "name": "main",
                "image": "img:1",
                "securityContext": {"runAsUser": 1000}
            }]
        }));
        let (violations, _) = run(&PolicyNoRootUser, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    // ── safe to evict ──

    #[tokio::test]
    async fn test_safe_to_evict_requires_annotation() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {}}]
        }));
        let (violations, _) = run(&PolicySafeToEvict, &ar).await;
        assert_eq!(violations.len(), 1);
    }

    #[tokio::test]
    async fn test_safe_to_evict_satisfied_by_annotation() {
        let ar = pod_request_with_metadata(
            json!({
                "name": "test-pod",
                "annotations": {"cluster-autoscaler.kubernetes.io/safe-to-evict": "true"}
            }),
            json!({
                "containers": [{"name": "main", "image": "img:1"}],
                "volumes": [{"name": "scratch", "emptyDir": {}}]
            }),
        );
        let (violations, _) = run(&PolicySafeToEvict, &ar).await;
        assert!(violations.is_empty());
    }

    // ── mutate safe to evict ──

    #[tokio::test]
    async fn test_mutate_safe_to_evict_adds_map_when_no_annotations() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {}}]
        }));
        let (violations, patches) = run(&PolicyMutateSafeToEvict, &ar).await;
        assert!(violations.is_empty());
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, "add");
        assert_eq!(patches[0].path, "/metadata/annotations");
    }

    #[tokio::test]
    async fn test_mutate_safe_to_evict_replaces_when_annotations_exist() {
        let ar = pod_request_with_metadata(
            json!({"name": "test-pod", "annotations": {"other": "x"}}),
            json!({
                "containers": [{"name": "main", "image": "img:1"}],
                "volumes": [{"name": "scratch", "hostPath": {"path": "/var"}}]
            }),
        );
        let (_, patches) = run(&PolicyMutateSafeToEvict, &ar).await;
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, "replace");
        assert_eq!(
            patches[0].path,
            "/metadata/annotations/cluster-autoscaler.kubernetes.io~1safe-to-evict"
        );
    }

    #[tokio::test]
    async fn test_mutate_safe_to_evict_respects_existing_value() {
        let ar = pod_request_with_metadata(
            json!({
                "name": "test-pod",
                "annotations": {"cluster-autoscaler.kubernetes.io/safe-to-evict": "false"}
            }),
            json!({
                "containers": [{"name": "main", "image": "img:1"}],
                "volumes": [{"name": "scratch", "emptyDir": {}}]
            }),
        );
        let (_, patches) = run(&PolicyMutateSafeToEvict, &ar).await;
        assert!(patches.is_empty());
    }

    // ── default seccomp ──

    #[tokio::test]
    async fn test_default_seccomp_patches_unset_pod() {
        let ar = pod_request(json!({"containers": [{"name": "main", "image": "img:1"}]}));
        let (_, patches) = run(&PolicyDefaultSeccompPolicy, &ar).await;
        assert_eq!(patches.len(), 1);
        assert_eq!(
            patches[0].value.as_ref().unwrap(),
            &json!({"seccomp.security.alpha.kubernetes.io/pod": "runtime/default"})
        );
    }

    #[tokio::test]
    async fn test_default_seccomp_uses_configured_profile() {
        let config = PolicyConfig {
            policy_default_seccomp_policy: "localhost/custom".to_string(),
            ..Default::default()
        };
        let ar = pod_request(json!({"containers": [{"name": "main", "image": "img:1"}]}));
        let (_, patches) = run_with(&PolicyDefaultSeccompPolicy, &config, &ar).await;
        assert_eq!(
            patches[0].value.as_ref().unwrap(),
            &json!({"seccomp.security.alpha.kubernetes.io/pod": "localhost/custom"})
        );
    }

    // ── image pull policy ──

    #[tokio::test]
    async fn test_image_pull_policy_patches_mismatch() {
        let config = PolicyConfig {
            policy_image_pull_policy: [(
                "Always".to_string(),
                vec!["^gcr.io/repo/.*".to_string()],
            )]
            .into(),
            ..Default::default()
        };
        let ar = pod_request(json!({
            "containers": [{
                "name": "main",
                "image": "gcr.io/repo/app:1",
                "imagePullPolicy": "IfNotPresent"
            }]
        }));
        let (_, patches) = run_with(&PolicyImagePullPolicy, &config, &ar).await;
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path, "/spec/containers/0/imagePullPolicy");
        assert_eq!(patches[0].value.as_ref().unwrap(), &json!("Always"));
    }

    #[tokio::test]
    async fn test_image_pull_policy_leaves_match_alone() {
        let config = PolicyConfig {
            policy_image_pull_policy: [(
                "Always".to_string(),
                vec!["^gcr.io/repo/.*".to_string()],
            )]
            .into(),
            ..Default::default()
        };
        let ar = pod_request(json!({
            "containers": [{
                "name": "main",
                "image": "gcr.io/repo/app:1",
                "imagePullPolicy": "Always"
            }]
        }));
        let (_, patches) = run_with(&PolicyImagePullPolicy, &config, &ar).await;
        assert!(patches.is_empty());
    }

    // ── empty dir size limit ──

    fn size_limit_config() -> PolicyConfig {
        PolicyConfig {
            policy_empty_dir_size_limit: crate::config::EmptyDirSizeLimit {
                default: "1".to_string(),
                max: "10".to_string(),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_dir_defaults_missing_size_limit() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {}}]
        }));
        let (violations, patches) = run_with(&PolicyEmptyDirSizeLimit, &size_limit_config(), &ar).await;
        assert!(violations.is_empty());
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].op, "replace");
        assert_eq!(patches[0].path, "/spec/volumes/0/emptyDir/sizeLimit");
        assert_eq!(patches[0].value.as_ref().unwrap(), &json!("1"));
    }

    #[tokio::test]
    async fn test_empty_dir_flags_limit_above_max() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {"sizeLimit": "20"}}]
        }));
        let (violations, patches) = run_with(&PolicyEmptyDirSizeLimit, &size_limit_config(), &ar).await;
        assert_eq!(violations.len(), 1);
        assert!(patches.is_empty());
    }

    #[tokio::test]
    async fn test_empty_dir_accepts_limit_within_max() {
        let ar = pod_request(json!({
            "containers": [{"name": "main", "image": "img:1"}],
            "volumes": [{"name": "scratch", "emptyDir": {"sizeLimit": "5"}}]
        }));
        let (violations, patches) = run_with(&PolicyEmptyDirSizeLimit, &size_limit_config(), &ar).await;
        assert!(violations.is_empty());
        assert!(patches.is_empty());
    }

    // ── quantity parsing ──

    #[test]
    fn test_parse_quantity_suffixes() {
        assert_eq!(parse_quantity("1"), Some(1.0));
        assert_eq!(parse_quantity("100m"), Some(0.1));
        assert_eq!(parse_quantity("1Ki"), Some(1024.0));
        assert_eq!(parse_quantity("2Gi"), Some(2.0 * 1073741824.0));
        assert_eq!(parse_quantity("1G"), Some(1e9));
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("garbage"), None);
    }

    #[test]
    fn test_quantity_ordering_across_suffixes() {
        assert!(parse_quantity("1Gi").unwrap() > parse_quantity("512Mi").unwrap());
        assert!(parse_quantity("1G").unwrap() < parse_quantity("1Gi").unwrap());
    }

    // ── no exec ──

    #[tokio::test]
    async fn test_no_exec_fires_on_exec_subresource() {
        let ar = admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "", "version": "v1", "kind": "PodExecOptions"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "subResource": "exec",
            "name": "target",
            "namespace": "default",
            "operation": "CONNECT",
            "userInfo": {},
            "object": {"apiVersion": "v1", "kind": "PodExecOptions", "command": ["sh"]}
        }));
        let (violations, _) = run(&PolicyNoExec, &ar).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].resource_kind, "PodExec");
    }

    #[tokio::test]
    async fn test_no_exec_ignores_pod_create() {
        let ar = pod_request(json!({"containers": [{"name": "main", "image": "img:1"}]}));
        let (violations, _) = run(&PolicyNoExec, &ar).await;
        assert!(violations.is_empty());
    }

    // ── workload projection sanity ──

    #[tokio::test]
    async fn test_policies_fire_on_deployment_template() {
        let ar = admission_request(json!({
            "uid": "uid-1",
            "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
            "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
            "name": "web",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {},
            "object": {
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "web"},
                "spec": {
                    "selector": {"matchLabels": {"app": "web"}},
                    "template": {
                        "spec": {
                            "hostNetwork": true,
                            "containers": [{"name": "main", "image": "img:1"}]
                        }
                    }
                }
            }
        }));
        let (violations, _) = run(&PolicyNoHostNetwork, &ar).await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].resource_kind, "Deployment");
        assert_eq!(violations[0].resource_name, "web");
    }
}

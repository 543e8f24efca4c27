use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{ReviewRequest, decode_as, resource_name};

/* ============================= VIEW ============================= */

/// The pod-shaped view of a request.
///
/// Every workload controller that embeds a pod template projects into this
/// one shape, so a single policy handles Pod, Deployment, ReplicaSet,
/// DaemonSet, StatefulSet, Job, CronJob and ReplicationController alike.
/// The resource name comes from the outer object, the spec and annotations
/// from the pod template.
#[derive(Debug, Clone)]
pub struct PodView {
    pub pod_spec: PodSpec,
    /// Template annotations. `None` is distinct from empty: mutating
    /// policies emit an `add` of the whole map when no annotations object
    /// exists and a keyed `replace` otherwise.
    pub pod_annotations: Option<BTreeMap<String, String>>,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

fn from_template(
    template: PodTemplateSpec,
    outer: &ObjectMeta,
    kind: &'static str,
) -> Option<PodView> {
    Some(PodView {
        pod_spec: template.spec?,
        pod_annotations: template.metadata.and_then(|m| m.annotations),
        resource_name: resource_name(outer),
        resource_kind: kind,
    })
}

/* ============================= DECODE ============================= */

/// Decode the pod view when the request's group/version/resource is one of
/// the known pod-carrying shapes. Legacy apiVersions decode through the
/// modern structs; unknown fields are dropped rather than failing the
/// request.
pub fn decode(req: &ReviewRequest<'_>) -> Option<PodView> {
    let ar = req.admission;
    let object = req.object()?;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );

    match gvr {
        ("", "v1", "pods") => {
            let pod: k8s_openapi::api::core::v1::Pod = decode_as(object)?;
            Some(PodView {
                pod_spec: pod.spec?,
                pod_annotations: pod.metadata.annotations.clone(),
                resource_name: resource_name(&pod.metadata),
                resource_kind: "Pod",
            })
        }
        ("", "v1", "replicationcontrollers") => {
            let rc: ReplicationController = decode_as(object)?;
            from_template(rc.spec?.template?, &rc.metadata, "ReplicationController")
        }
        ("extensions", "v1beta1", "deployments")
        | ("apps", "v1beta1", "deployments")
        | ("apps", "v1beta2", "deployments")
        | ("apps", "v1", "deployments") => {
            let dep: Deployment = decode_as(object)?;
            from_template(dep.spec?.template, &dep.metadata, "Deployment")
        }
        ("extensions", "v1beta1", "replicasets")
        | ("apps", "v1beta2", "replicasets")
        | ("apps", "v1", "replicasets") => {
            let rs: ReplicaSet = decode_as(object)?;
            from_template(rs.spec?.template?, &rs.metadata, "ReplicaSet")
        }
        ("extensions", "v1beta1", "daemonsets")
        | ("apps", "v1beta2", "daemonsets")
        | ("apps", "v1", "daemonsets") => {
            let ds: DaemonSet = decode_as(object)?;
            from_template(ds.spec?.template, &ds.metadata, "DaemonSet")
        }
        ("apps", "v1beta1", "statefulsets")
        | ("apps", "v1beta2", "statefulsets")
        | ("apps", "v1", "statefulsets") => {
            let ss: StatefulSet = decode_as(object)?;
            from_template(ss.spec?.template, &ss.metadata, "StatefulSet")
        }
        ("batch", "v1", "jobs") => {
            let job: Job = decode_as(object)?;
            from_template(job.spec?.template, &job.metadata, "Job")
        }
        ("batch", "v2alpha1", "cronjobs")
        | ("batch", "v1beta1", "cronjobs")
        | ("batch", "v1", "cronjobs") => {
            let cronjob: CronJob = decode_as(object)?;
            let job_template = cronjob.spec?.job_template;
            let annotations = job_template.metadata.and_then(|m| m.annotations);
            Some(PodView {
                pod_spec: job_template.spec?.template.spec?,
                pod_annotations: annotations,
                resource_name: resource_name(&cronjob.metadata),
                resource_kind: "CronJob",
            })
        }
        _ => None,
    }
}

/* ============================= TESTS ============================= */

use serde::Deserialize;

use super::{ReviewRequest, decode_as};

/// `PodExecOptions` isn't modeled in `k8s-openapi` (exec is handled via raw
/// query params by real clients, not a schema'd body), so the fields this
/// module needs are declared locally.
#[derive(Debug, Clone, Deserialize)]
struct PodExecOptions {
    command: Option<Vec<String>>,
}

/// View of an exec into a pod. Matched on the request kind because exec
/// arrives as a CONNECT on the `pods/exec` subresource.
#[derive(Debug, Clone)]
pub struct PodExecView {
    pub command: String,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<PodExecView> {
    let ar = req.admission;
    let gvk = (
        ar.kind.group.as_str(),
        ar.kind.version.as_str(),
        ar.kind.kind.as_str(),
    );
    match gvk {
        ("", "v1", "PodExecOptions") => {
            let options: PodExecOptions = decode_as(req.object()?)?;
            Some(PodExecView {
                command: options.command.unwrap_or_default().join(" "),
                resource_name: ar.name.clone(),
                resource_kind: "PodExec",
            })
        }
        _ => None,
    }
}

use k8s_openapi::api::policy::v1::PodDisruptionBudget;

use super::{ReviewRequest, decode_as, resource_name};

#[derive(Debug, Clone)]
pub struct PodDisruptionBudgetView {
    pub pod_disruption_budget: PodDisruptionBudget,
    pub resource_name: String,
    pub resource_kind: &'static str,
}

pub fn decode(req: &ReviewRequest<'_>) -> Option<PodDisruptionBudgetView> {
    let ar = req.admission;
    let gvr = (
        ar.resource.group.as_str(),
        ar.resource.version.as_str(),
        ar.resource.resource.as_str(),
    );
    match gvr {
        ("policy", "v1beta1", "poddisruptionbudgets") | ("policy", "v1", "poddisruptionbudgets") => {
            let pod_disruption_budget: PodDisruptionBudget = decode_as(req.object()?)?;
            let name = resource_name(&pod_disruption_budget.metadata);
            Some(PodDisruptionBudgetView {
                pod_disruption_budget,
                resource_name: name,
                resource_kind: "PodDisruptionBudget",
            })
        }
        _ => None,
    }
}

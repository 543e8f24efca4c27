//! Helpers shared by unit tests.

use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;

/// Build a typed admission request from its JSON form.
pub fn admission_request(body: serde_json::Value) -> AdmissionRequest<DynamicObject> {
    serde_json::from_value(body).expect("valid admission request json")
}

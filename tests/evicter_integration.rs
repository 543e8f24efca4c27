use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use k_rail::evicter::{
    ANNOTATION_PREVENT_EVICTION, ANNOTATION_TIMESTAMP, can_evict,
};

fn tainted_pod(annotations: &[(&str, String)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("tainted".to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_eviction_predicate_matrix() {
    let now = Utc::now().timestamp();
    let incubation = Duration::from_secs(1);

    // aged out of the incubation period
    let pod = tainted_pod(&[(ANNOTATION_TIMESTAMP, (now - 2).to_string())]);
    assert!(can_evict(&pod, incubation));

    // still incubating
    let pod = tainted_pod(&[(ANNOTATION_TIMESTAMP, now.to_string())]);
    assert!(!can_evict(&pod, incubation));

    // prevent-eviction wins regardless of age, case-insensitively
    for value in ["true", "yes", "TRUE", "YES"] {
        let pod = tainted_pod(&[
            (ANNOTATION_TIMESTAMP, (now - 100).to_string()),
            (ANNOTATION_PREVENT_EVICTION, value.to_string()),
        ]);
        assert!(!can_evict(&pod, incubation), "value {value:?}");
    }

    // a malformed timestamp is evictable, the tainted label is the gate
    let pod = tainted_pod(&[(ANNOTATION_TIMESTAMP, "garbage".to_string())]);
    assert!(can_evict(&pod, incubation));
}

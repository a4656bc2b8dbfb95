//! Pod quality-of-service class derivation
//!
//! Follows the Kubernetes QoS rules: BestEffort when no container sets cpu
//! or memory requests/limits; Guaranteed when every container carries cpu
//! and memory limits with requests, when present, equal to them; Burstable
//! otherwise.

use crate::quantity;
use k8s_openapi::api::core::v1::{Container, Pod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl QosClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QosClass::Guaranteed => "Guaranteed",
            QosClass::Burstable => "Burstable",
            QosClass::BestEffort => "BestEffort",
        }
    }
}

fn is_qos_resource(name: &str) -> bool {
    name == "cpu" || name == "memory"
}

fn containers_of(pod: &Pod) -> Vec<&Container> {
    let mut all = Vec::new();
    if let Some(spec) = &pod.spec {
        all.extend(spec.containers.iter());
        if let Some(init) = &spec.init_containers {
            all.extend(init.iter());
        }
    }
    all
}

/// Compute the pod QoS class
pub fn pod_qos(pod: &Pod) -> QosClass {
    let mut any_request_or_limit = false;
    let mut guaranteed = true;

    for container in containers_of(pod) {
        let resources = container.resources.as_ref();
        let requests = resources.and_then(|r| r.requests.as_ref());
        let limits = resources.and_then(|r| r.limits.as_ref());

        let mut cpu_limited = false;
        let mut memory_limited = false;

        if let Some(limits) = limits {
            for (name, q) in limits {
                if !is_qos_resource(name) {
                    continue;
                }
                any_request_or_limit = true;
                match name.as_str() {
                    "cpu" => cpu_limited = true,
                    "memory" => memory_limited = true,
                    _ => {}
                }
                if let Some(requests) = requests {
                    if let Some(req) = requests.get(name) {
                        if quantity::milli_value(req) != quantity::milli_value(q) {
                            guaranteed = false;
                        }
                    }
                }
            }
        }

        if let Some(requests) = requests {
            for (name, _) in requests {
                if is_qos_resource(name) {
                    any_request_or_limit = true;
                }
            }
        }

        if !(cpu_limited && memory_limited) {
            guaranteed = false;
        }
    }

    if !any_request_or_limit {
        return QosClass::BestEffort;
    }
    if guaranteed {
        return QosClass::Guaranteed;
    }
    QosClass::Burstable
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn pod_with(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Pod {
        let to_map = |entries: &[(&str, &str)]| -> Option<BTreeMap<String, Quantity>> {
            if entries.is_empty() {
                None
            } else {
                Some(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
                        .collect(),
                )
            }
        };
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".into(),
                    resources: Some(ResourceRequirements {
                        requests: to_map(requests),
                        limits: to_map(limits),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_best_effort() {
        assert_eq!(pod_qos(&pod_with(&[], &[])), QosClass::BestEffort);
    }

    #[test]
    fn test_burstable() {
        let pod = pod_with(&[("cpu", "100m")], &[]);
        assert_eq!(pod_qos(&pod), QosClass::Burstable);
    }

    #[test]
    fn test_guaranteed() {
        let pod = pod_with(
            &[("cpu", "500m"), ("memory", "1Gi")],
            &[("cpu", "500m"), ("memory", "1Gi")],
        );
        assert_eq!(pod_qos(&pod), QosClass::Guaranteed);
    }

    #[test]
    fn test_limits_without_memory_is_burstable() {
        let pod = pod_with(&[], &[("cpu", "500m")]);
        assert_eq!(pod_qos(&pod), QosClass::Burstable);
    }
}

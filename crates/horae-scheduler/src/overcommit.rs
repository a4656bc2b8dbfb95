//! Overcommit allowance calculation
//!
//! Nodes opt into overcommit through annotations carrying a ratio per
//! resource; the additional allocatable is `round(base allocatable x ratio)`.
//! Errors are collected per resource so one malformed annotation does not
//! abort the others.

use crate::framework::{NodeInfo, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY};
use horae_common::HoraeError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

fn node_allocatable_resource(node_info: &NodeInfo, resource: &str) -> Result<i64, HoraeError> {
    match resource {
        RESOURCE_CPU => Ok(node_info.allocatable.milli_cpu),
        RESOURCE_MEMORY => Ok(node_info.allocatable.memory),
        RESOURCE_EPHEMERAL_STORAGE => Ok(node_info.allocatable.ephemeral_storage),
        other => Err(HoraeError::UnsupportedResource(other.to_string())),
    }
}

fn to_quantity(resource: &str, value: i64) -> Result<Quantity, HoraeError> {
    match resource {
        RESOURCE_CPU => Ok(Quantity(format!("{}m", value))),
        RESOURCE_MEMORY | RESOURCE_EPHEMERAL_STORAGE => Ok(Quantity(value.to_string())),
        other => Err(HoraeError::UnsupportedResource(other.to_string())),
    }
}

/// Calculate the overcommit allowances a node advertises via annotations.
/// Resources with no annotation are skipped. Every per-resource failure is
/// collected; any failure makes the whole calculation an error.
pub fn calculate_overcommit_resources(
    node_info: &NodeInfo,
    annotations: &[(&str, &str)],
) -> Result<BTreeMap<String, Quantity>, HoraeError> {
    let mut results = BTreeMap::new();
    let mut errors: Vec<String> = Vec::new();

    let node_annotations = node_info
        .node()
        .and_then(|n| n.metadata.annotations.as_ref());

    for (resource, annotation) in annotations {
        let Some(raw) = node_annotations.and_then(|a| a.get(*annotation)) else {
            continue;
        };

        let ratio: f64 = match raw.parse() {
            Ok(v) => v,
            Err(err) => {
                errors.push(format!(
                    "failed to parse ratio for resource {}: {}",
                    resource, err
                ));
                continue;
            }
        };

        if ratio < 0.0 {
            errors.push(format!(
                "invalid ratio for resource {}: got {}",
                resource, ratio
            ));
            continue;
        }

        let allocatable = match node_allocatable_resource(node_info, resource) {
            Ok(v) => v,
            Err(err) => {
                errors.push(format!(
                    "failed to get allocatable resource for {}: {}",
                    resource, err
                ));
                continue;
            }
        };

        let value = (allocatable as f64 * ratio).round() as i64;
        match to_quantity(resource, value) {
            Ok(q) => {
                results.insert(resource.to_string(), q);
            }
            Err(err) => {
                errors.push(format!(
                    "failed to convert resource {} to quantity: {}",
                    resource, err
                ));
            }
        }
    }

    if !errors.is_empty() {
        return Err(HoraeError::OvercommitError(errors.join("; ")));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity;
    use horae_api::resources::NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION;
    use k8s_openapi::api::core::v1::{Node, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node_info_with(capacity: &[(&str, &str)], annotations: &[(&str, &str)]) -> NodeInfo {
        let list: BTreeMap<String, Quantity> = capacity
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
            .collect();
        let mut info = NodeInfo::default();
        info.set_node(Node {
            metadata: ObjectMeta {
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(list.clone()),
                allocatable: Some(list),
                ..Default::default()
            }),
            ..Default::default()
        });
        info
    }

    const ANNOTATIONS: &[(&str, &str)] = &[("cpu", NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION)];

    #[test]
    fn test_cpu_ratio_yields_overcommitable_millis() {
        let info = node_info_with(
            &[("cpu", "1000m")],
            &[(NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION, "0.3")],
        );
        let result = calculate_overcommit_resources(&info, ANNOTATIONS).unwrap();
        assert_eq!(quantity::milli_value(&result["cpu"]), 300);
    }

    #[test]
    fn test_memory_ratio() {
        let annotations: &[(&str, &str)] = &[("memory", "horae.dev/memory-overcommit-ratio")];
        let info = node_info_with(
            &[("memory", "1024Mi")],
            &[("horae.dev/memory-overcommit-ratio", "0.5")],
        );
        let result = calculate_overcommit_resources(&info, annotations).unwrap();
        assert_eq!(quantity::value(&result["memory"]), 512 * 1024 * 1024);
    }

    #[test]
    fn test_negative_ratio_is_error() {
        let info = node_info_with(
            &[("cpu", "1000m")],
            &[(NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION, "-0.5")],
        );
        assert!(calculate_overcommit_resources(&info, ANNOTATIONS).is_err());
    }

    #[test]
    fn test_unparseable_ratio_is_error() {
        let info = node_info_with(
            &[("cpu", "1000m")],
            &[(NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION, "lots")],
        );
        assert!(calculate_overcommit_resources(&info, ANNOTATIONS).is_err());
    }

    #[test]
    fn test_missing_annotation_is_skipped() {
        let info = node_info_with(&[("cpu", "1000m")], &[]);
        let result = calculate_overcommit_resources(&info, ANNOTATIONS).unwrap();
        assert!(result.is_empty());
    }
}

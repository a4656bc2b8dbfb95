//! Capacity and temporal fit checks

use crate::framework::{
    InsufficientResource, NodeInfo, Resource, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE,
    RESOURCE_MEMORY,
};
use crate::types::Forecast;
use k8s_openapi::api::core::v1::Pod;
use std::collections::{HashMap, HashSet};

/// Compute the effective resource request of a pod: the sum over its
/// containers, the maximum across init containers, plus pod overhead
pub fn compute_pod_resource_request(pod: &Pod) -> Resource {
    let mut result = Resource::default();
    let Some(spec) = &pod.spec else {
        return result;
    };

    for container in &spec.containers {
        if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref()) {
            result.add(requests);
        }
    }

    if let Some(init_containers) = &spec.init_containers {
        for container in init_containers {
            if let Some(requests) = container.resources.as_ref().and_then(|r| r.requests.as_ref())
            {
                result.set_max_resource(requests);
            }
        }
    }

    if let Some(overhead) = &spec.overhead {
        result.add(overhead);
    }

    result
}

/// Check a pod's declared request against a node's remaining allocatable.
/// Resources in `ignored` are skipped; every insufficiency is collected so
/// the caller can keep all failure reasons.
pub fn fits_request(
    pod_request: &Resource,
    node_info: &NodeInfo,
    ignored: &HashSet<String>,
) -> Vec<InsufficientResource> {
    let mut insufficient = Vec::new();

    let allowed_pod_number = node_info.allocatable.allowed_pod_number;
    if allowed_pod_number > 0 && node_info.pods.len() as i64 + 1 > allowed_pod_number {
        insufficient.push(InsufficientResource {
            resource_name: "pods".to_string(),
            reason: "Too many pods".to_string(),
            requested: 1,
            used: node_info.pods.len() as i64,
            capacity: allowed_pod_number,
        });
    }

    if pod_request.milli_cpu == 0
        && pod_request.memory == 0
        && pod_request.ephemeral_storage == 0
        && pod_request.scalar_resources.is_empty()
    {
        return insufficient;
    }

    let mut check = |name: &str, requested: i64, allocatable: i64, used: i64, ignore: bool| {
        if !ignore && requested > allocatable - used {
            insufficient.push(InsufficientResource {
                resource_name: name.to_string(),
                reason: format!("Insufficient {}", name),
                requested,
                used,
                capacity: allocatable,
            });
        }
    };

    check(
        RESOURCE_CPU,
        pod_request.milli_cpu,
        node_info.allocatable.milli_cpu,
        node_info.requested.milli_cpu,
        ignored.contains(RESOURCE_CPU),
    );
    check(
        RESOURCE_MEMORY,
        pod_request.memory,
        node_info.allocatable.memory,
        node_info.requested.memory,
        ignored.contains(RESOURCE_MEMORY),
    );
    check(
        RESOURCE_EPHEMERAL_STORAGE,
        pod_request.ephemeral_storage,
        node_info.allocatable.ephemeral_storage,
        node_info.requested.ephemeral_storage,
        false,
    );

    for (name, requested) in &pod_request.scalar_resources {
        if *requested == 0 {
            continue;
        }
        let allocatable = node_info
            .allocatable
            .scalar_resources
            .get(name)
            .copied()
            .unwrap_or(0);
        let used = node_info
            .requested
            .scalar_resources
            .get(name)
            .copied()
            .unwrap_or(0);
        if *requested > allocatable - used {
            insufficient.push(InsufficientResource {
                resource_name: name.clone(),
                reason: format!("Insufficient {}", name),
                requested: *requested,
                used,
                capacity: allocatable,
            });
        }
    }

    insufficient
}

/// Check the node's composed 48-hour forecast against its allocatable.
/// `requested` carries the incoming pod's own forecast, used to attribute
/// the per-hour requested share in the failure reason.
pub fn fits_request_with_temporal(
    requested: &HashMap<String, Forecast>,
    forecasts: &HashMap<String, Forecast>,
    node_info: &NodeInfo,
) -> Vec<InsufficientResource> {
    let mut insufficient = Vec::new();

    for (resource, forecast) in forecasts {
        let allocatable = match resource.as_str() {
            RESOURCE_CPU => node_info.allocatable.milli_cpu,
            RESOURCE_MEMORY => node_info.allocatable.memory,
            _ => continue,
        };

        let periods = [
            (&forecast.week_day_hour, true),
            (&forecast.weekend_hour, false),
        ];
        for (hours, is_weekday) in periods {
            for (hour, value) in hours {
                let total = (*value as f64).round() as i64;
                if total <= allocatable {
                    continue;
                }
                let requested_val = requested
                    .get(resource)
                    .map(|f| {
                        let map = if is_weekday {
                            &f.week_day_hour
                        } else {
                            &f.weekend_hour
                        };
                        map.get(hour)
                            .map(|v| (*v as f64).round() as i64)
                            .unwrap_or(0)
                    })
                    .unwrap_or(0);
                insufficient.push(InsufficientResource {
                    resource_name: resource.clone(),
                    reason: format!("Insufficient {} at hour: {}", resource, hour),
                    requested: requested_val,
                    used: total - requested_val,
                    capacity: allocatable,
                });
            }
        }
    }

    insufficient
}

//! Forecast composition
//!
//! Derives a per-pod hourly usage profile from its UsageTemplate status, or
//! from its QoS class when no evaluated template exists, and sums profiles
//! across the pods of a node.

use crate::cache::UsageTemplateManager;
use crate::framework::{Code, InsufficientResource, Resource, Status};
use crate::qos::{pod_qos, QosClass};
use crate::types::{Forecast, NamespacedPod, NUM_HOURS_IN_A_DAY};
use horae_api::resources::{forecast_unit, CPU_RESOURCE, MEMORY_RESOURCE};
use horae_api::UsageTemplate;
use horae_common::HoraeError;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use tracing::{error, warn};

/// Default CPU request assumed for best-effort pods, in millicores
pub const DEFAULT_MILLI_CPU_REQUEST: i64 = 100;
/// Default memory request assumed for best-effort pods, in bytes
pub const DEFAULT_MEMORY_REQUEST: i64 = 200 * 1024 * 1024;

fn same_utilization_by_hour(resource: &str, milli_value: f32) -> Forecast {
    let mut result = Forecast::new(resource, forecast_unit(resource).unwrap_or_default());
    for hour in 0..NUM_HOURS_IN_A_DAY as i16 {
        result.week_day_hour.insert(hour, milli_value);
        result.weekend_hour.insert(hour, milli_value);
    }
    result
}

fn default_resource_value(resource: &str) -> Result<i64, HoraeError> {
    match resource {
        CPU_RESOURCE => Ok(DEFAULT_MILLI_CPU_REQUEST),
        MEMORY_RESOURCE => Ok(DEFAULT_MEMORY_REQUEST),
        other => Err(HoraeError::UnsupportedResource(other.to_string())),
    }
}

/// Milli value of one resource dimension. Memory follows the quantity
/// milli-value convention (bytes x 1000).
fn resource_value(resource: &str, from: &Resource) -> Result<i64, HoraeError> {
    match resource {
        CPU_RESOURCE => Ok(from.milli_cpu),
        MEMORY_RESOURCE => Ok(from.memory * 1000),
        other => Err(HoraeError::UnsupportedResource(other.to_string())),
    }
}

/// Aggregate requests and limits of a pod: containers summed, init
/// containers taken as a maximum, overhead added to requests
pub fn pod_requests_and_limits(pod: &Pod) -> (Resource, Resource) {
    let mut requests = Resource::default();
    let mut limits = Resource::default();

    let Some(spec) = &pod.spec else {
        return (requests, limits);
    };

    for container in &spec.containers {
        if let Some(resources) = &container.resources {
            if let Some(r) = &resources.requests {
                requests.add(r);
            }
            if let Some(l) = &resources.limits {
                limits.add(l);
            }
        }
    }
    if let Some(init_containers) = &spec.init_containers {
        for container in init_containers {
            if let Some(resources) = &container.resources {
                if let Some(r) = &resources.requests {
                    requests.set_max_resource(r);
                }
                if let Some(l) = &resources.limits {
                    limits.set_max_resource(l);
                }
            }
        }
    }
    if let Some(overhead) = &spec.overhead {
        requests.add(overhead);
    }

    (requests, limits)
}

/// Assume a flat usage profile from the pod QoS class: best-effort pods use
/// the default request, guaranteed pods their limits, burstable pods their
/// requests
pub fn assume_usage_by_class(pod: &Pod, resource: &str) -> Result<Forecast, HoraeError> {
    let class = pod_qos(pod);

    if class == QosClass::BestEffort {
        let v = default_resource_value(resource)?;
        return Ok(same_utilization_by_hour(resource, v as f32));
    }

    let (requests, limits) = pod_requests_and_limits(pod);
    let v = if class == QosClass::Guaranteed {
        resource_value(resource, &limits)?
    } else {
        resource_value(resource, &requests)?
    };
    Ok(same_utilization_by_hour(resource, v as f32))
}

/// Read the evaluated hourly profile off a template status.
///
/// Profiles of workloads that are not long running are shifted so their
/// first observed hour lands on the current hour, and the observed day
/// type is copied over to hours absent in the other day type.
pub fn extract_usage_from_template(
    ut: &UsageTemplate,
    resource: &str,
    current_hour: i64,
) -> Result<Forecast, HoraeError> {
    let status = ut
        .status
        .as_ref()
        .ok_or_else(|| HoraeError::NotFound("no usage template status".to_string()))?;
    let historical = status
        .historical_usage
        .as_ref()
        .ok_or_else(|| HoraeError::NotFound("no usage template historical usage".to_string()))?;

    let mut result = Forecast::new(resource, forecast_unit(resource).unwrap_or_default());

    let offset = if status.is_long_running {
        0
    } else {
        current_hour
    };

    for item in &historical.items {
        if item.resource != resource {
            continue;
        }
        for usage in &item.usages {
            let value: f64 = match usage.value.parse() {
                Ok(v) => v,
                Err(err) => {
                    error!(value = %usage.value, %err, "cannot parse sample value");
                    continue;
                }
            };

            let offset_hour = ((offset + usage.hour as i64) % NUM_HOURS_IN_A_DAY) as i16;
            if usage.is_weekday {
                result.week_day_hour.insert(offset_hour, value as f32);
            } else {
                result.weekend_hour.insert(offset_hour, value as f32);
            }
        }
    }

    // A short-lived workload observed only on one day type is assumed to
    // behave the same on the other; copy hours that have no sample there.
    if !status.is_long_running {
        let old_weekend: Vec<(i16, f32)> = result
            .weekend_hour
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();

        for (hour, value) in result.week_day_hour.clone() {
            result.weekend_hour.entry(hour).or_insert(value);
        }
        for (hour, value) in old_weekend {
            result.week_day_hour.entry(hour).or_insert(value);
        }
    }

    Ok(result)
}

/// Compose the per-resource forecasts for one pod, falling back to the QoS
/// assumption when the template is absent, disabled or not yet evaluated
pub fn get_forecasts_by_pod(
    mgr: &UsageTemplateManager,
    namespace: &str,
    pod_name: &str,
    target_resources: &[&str],
    current_hour: i64,
) -> Result<HashMap<String, Forecast>, HoraeError> {
    let pod = mgr
        .pod_lister()
        .get(namespace, pod_name)
        .ok_or_else(|| HoraeError::NotFound(format!("pod {}/{}", namespace, pod_name)))?;

    let (_, ut) = mgr.get_usage_template(&pod);
    let mut usages = HashMap::new();

    for resource in target_resources {
        let forecast = match &ut {
            Some(template) if template.spec.enabled => {
                let evaluated = template
                    .status
                    .as_ref()
                    .and_then(|s| s.historical_usage.as_ref())
                    .is_some();
                if evaluated {
                    extract_usage_from_template(template, resource, current_hour)
                } else {
                    assume_usage_by_class(&pod, resource)
                }
            }
            _ => assume_usage_by_class(&pod, resource),
        };

        match forecast {
            Ok(f) => {
                usages.insert(resource.to_string(), f);
            }
            Err(err) => {
                error!(%resource, pod = pod_name, namespace, %err, "unable to obtain usage for pod");
                return Err(err);
            }
        }
    }

    Ok(usages)
}

/// Sum the hourly forecasts of a set of pods into per-resource node totals.
/// Fails fast when any pod lookup errors.
pub fn sum_pod_usage_by_node(
    pods: &[NamespacedPod],
    mgr: &UsageTemplateManager,
    target_resources: &[&str],
    current_hour: i64,
) -> Result<HashMap<String, Forecast>, HoraeError> {
    let mut results: HashMap<String, Forecast> = HashMap::new();

    for pod in pods {
        let usages =
            get_forecasts_by_pod(mgr, &pod.namespace, &pod.name, target_resources, current_hour)?;

        for (resource, forecast) in usages {
            let entry = results.entry(resource.clone()).or_insert_with(|| {
                Forecast::new(&resource, forecast_unit(&resource).unwrap_or_default())
            });

            if forecast.week_day_hour.is_empty() && forecast.weekend_hour.is_empty() {
                warn!(pod = %pod.name, %resource, "empty usage forecast for pod");
                continue;
            }

            for (hour, value) in &forecast.week_day_hour {
                *entry.week_day_hour.entry(*hour).or_insert(0.0) += value;
            }
            for (hour, value) in &forecast.weekend_hour {
                *entry.weekend_hour.entry(*hour).or_insert(0.0) += value;
            }
        }
    }

    Ok(results)
}

/// Forecast for a node including the incoming pod
pub fn obtain_forecasts(
    mgr: &UsageTemplateManager,
    node_name: &str,
    pod: &Pod,
    target_resources: &[&str],
    current_hour: i64,
) -> Result<HashMap<String, Forecast>, HoraeError> {
    let mut pods = mgr.get_node_pods(node_name);
    pods.push(NamespacedPod::new(
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default(),
    ));

    sum_pod_usage_by_node(&pods, mgr, target_resources, current_hour)
}

/// Collapse collected insufficiencies into an Unschedulable status,
/// keeping all failure reasons
pub fn check_insufficient_resources(insufficient: Vec<InsufficientResource>) -> Option<Status> {
    if insufficient.is_empty() {
        return None;
    }
    Some(Status::new(
        Code::Unschedulable,
        insufficient.into_iter().map(|i| i.reason).collect(),
    ))
}

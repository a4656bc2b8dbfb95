//! Builders shared by the plugin integration tests

use horae_api::usage_template::{ResourceUsage, ResourceUsages, Sample, UsageTemplateStatus};
use horae_api::{UsageTemplate, UsageTemplateSpec};
use horae_scheduler::framework::NodeInfo;
use horae_scheduler::lister::{MemoryNodeInfoLister, MemoryPodLister, MemoryUsageTemplateLister};
use horae_scheduler::UsageTemplateManager;
use k8s_openapi::api::core::v1::{Container, Node, NodeStatus, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Usage across [start, end) hour periods, as (start, end, usage) triples
pub fn make_usage_across_periods(periods: &[(i32, i32, f32)]) -> HashMap<i32, f32> {
    let mut results = HashMap::new();
    for (start, end, usage) in periods {
        for hour in *start..*end {
            results.insert(hour, *usage);
        }
    }
    results
}

/// The same usage value for all 24 hours of a day
pub fn same_usage_a_day(usage: f32) -> HashMap<i32, f32> {
    (0..24).map(|h| (h, usage)).collect()
}

fn make_resource_usages(
    resource_usages: &HashMap<&str, HashMap<i32, f32>>,
    resources: &mut Vec<String>,
    is_weekday: bool,
) -> Vec<ResourceUsage> {
    let mut items = Vec::new();
    for (resource, usages) in resource_usages {
        if !resources.contains(&resource.to_string()) {
            resources.push(resource.to_string());
        }
        let samples = usages
            .iter()
            .map(|(hour, value)| Sample {
                hour: *hour,
                value: format!("{:.2}", value),
                percentile: String::new(),
                unit: String::new(),
                is_weekday,
            })
            .collect();
        items.push(ResourceUsage {
            resource: resource.to_string(),
            usages: samples,
        });
    }
    items
}

/// A usage template with evaluated weekday and weekend profiles
pub fn make_usage_template(
    name: &str,
    namespace: &str,
    enabled: bool,
    qos_class: &str,
    weekday_usages: &HashMap<&str, HashMap<i32, f32>>,
    weekend_usages: &HashMap<&str, HashMap<i32, f32>>,
    is_long_running: bool,
) -> UsageTemplate {
    let mut resources = Vec::new();
    let mut items = make_resource_usages(weekday_usages, &mut resources, true);
    items.extend(make_resource_usages(weekend_usages, &mut resources, false));

    let mut ut = UsageTemplate::new(
        name,
        UsageTemplateSpec {
            enabled,
            resources,
            quality_of_service_class: qos_class.to_string(),
            ..Default::default()
        },
    );
    ut.metadata.namespace = Some(namespace.to_string());
    ut.status = Some(UsageTemplateStatus {
        historical_usage: Some(ResourceUsages { items }),
        is_long_running,
        ..Default::default()
    });
    ut
}

pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                spec: Some(PodSpec::default()),
                ..Default::default()
            },
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn cpu_request(mut self, request: &str) -> Self {
        let spec = self.pod.spec.as_mut().unwrap();
        let name = format!("c{}", spec.containers.len() + 1);
        spec.containers.push(Container {
            name,
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "cpu".to_string(),
                    Quantity(request.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        });
        self
    }

    pub fn node(mut self, node_name: &str) -> Self {
        self.pod.spec.as_mut().unwrap().node_name = Some(node_name.to_string());
        self
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

pub fn make_node(name: &str, capacity: &[(&str, &str)]) -> Node {
    let list: BTreeMap<String, Quantity> = capacity
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect();
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            capacity: Some(list.clone()),
            allocatable: Some(list),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Wire a manager over in-memory listers, the way the framework would hand
/// the plugin its informer caches
pub fn make_manager(
    nodes: &[Node],
    pods: &[Pod],
    templates: &[UsageTemplate],
) -> Arc<UsageTemplateManager> {
    let pod_lister = Arc::new(MemoryPodLister::new());
    for pod in pods {
        pod_lister.insert(pod.clone());
    }

    let template_lister = Arc::new(MemoryUsageTemplateLister::new());
    for template in templates {
        template_lister.insert(template.clone());
    }

    let snapshot = Arc::new(MemoryNodeInfoLister::new());
    for node in nodes {
        let mut info = NodeInfo::default();
        info.set_node(node.clone());
        snapshot.insert(node.metadata.name.as_deref().unwrap_or_default(), info);
    }

    Arc::new(UsageTemplateManager::new(template_lister, pod_lister, snapshot))
}

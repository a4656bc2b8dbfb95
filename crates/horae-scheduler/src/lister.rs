//! Lister interfaces to the orchestrator's shared caches
//!
//! The scheduling framework hands the plugin read access to its informer
//! caches; these traits are the narrow surface the plugin consumes. The
//! in-memory implementations back tests and standalone runs.

use crate::framework::NodeInfo;
use horae_api::UsageTemplate;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::sync::RwLock;

/// Read access to pods by namespace and name
pub trait PodLister: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Option<Pod>;
}

/// Read access to usage templates by namespace and name
pub trait UsageTemplateLister: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Option<UsageTemplate>;
}

/// Read access to the scheduler's node snapshot
pub trait NodeInfoLister: Send + Sync {
    fn get(&self, node_name: &str) -> Option<NodeInfo>;
}

#[derive(Default)]
pub struct MemoryPodLister {
    pods: RwLock<HashMap<(String, String), Pod>>,
}

impl MemoryPodLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.write().unwrap().insert((namespace, name), pod);
    }
}

impl PodLister for MemoryPodLister {
    fn get(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[derive(Default)]
pub struct MemoryUsageTemplateLister {
    templates: RwLock<HashMap<(String, String), UsageTemplate>>,
}

impl MemoryUsageTemplateLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: UsageTemplate) {
        let namespace = template.metadata.namespace.clone().unwrap_or_default();
        let name = template.metadata.name.clone().unwrap_or_default();
        self.templates
            .write()
            .unwrap()
            .insert((namespace, name), template);
    }
}

impl UsageTemplateLister for MemoryUsageTemplateLister {
    fn get(&self, namespace: &str, name: &str) -> Option<UsageTemplate> {
        self.templates
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[derive(Default)]
pub struct MemoryNodeInfoLister {
    nodes: RwLock<HashMap<String, NodeInfo>>,
}

impl MemoryNodeInfoLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, node_name: &str, info: NodeInfo) {
        self.nodes
            .write()
            .unwrap()
            .insert(node_name.to_string(), info);
    }
}

impl NodeInfoLister for MemoryNodeInfoLister {
    fn get(&self, node_name: &str) -> Option<NodeInfo> {
        self.nodes.read().unwrap().get(node_name).cloned()
    }
}

//! Node/pod cache and usage template lookup
//!
//! Tracks which pods are assigned or reserved on which node. Readers are
//! the filter and score stages; writers are the pod informer callbacks and
//! Reserve/Unreserve. A pod appears under at most one node key.

use crate::lister::{NodeInfoLister, PodLister, UsageTemplateLister};
use crate::types::NamespacedPod;
use horae_api::resources::USAGE_TEMPLATE_LABEL;
use horae_api::UsageTemplate;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

fn usage_template_label(pod: &Pod) -> String {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(USAGE_TEMPLATE_LABEL))
        .cloned()
        .unwrap_or_default()
}

fn node_name(pod: &Pod) -> String {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.clone())
        .unwrap_or_default()
}

fn is_assigned(pod: &Pod) -> bool {
    !node_name(pod).is_empty()
}

pub struct UsageTemplateManager {
    template_lister: Arc<dyn UsageTemplateLister>,
    pod_lister: Arc<dyn PodLister>,
    snapshot: Arc<dyn NodeInfoLister>,
    node_pods: RwLock<HashMap<String, Vec<NamespacedPod>>>,
}

impl UsageTemplateManager {
    pub fn new(
        template_lister: Arc<dyn UsageTemplateLister>,
        pod_lister: Arc<dyn PodLister>,
        snapshot: Arc<dyn NodeInfoLister>,
    ) -> Self {
        Self {
            template_lister,
            pod_lister,
            snapshot,
            node_pods: RwLock::new(HashMap::new()),
        }
    }

    pub fn pod_lister(&self) -> &dyn PodLister {
        self.pod_lister.as_ref()
    }

    pub fn snapshot(&self) -> &dyn NodeInfoLister {
        self.snapshot.as_ref()
    }

    /// Returns the namespaced key and, when it exists, the UsageTemplate a
    /// pod belongs to. Pods without the label have no template.
    pub fn get_usage_template(&self, pod: &Pod) -> (String, Option<UsageTemplate>) {
        let template_name = usage_template_label(pod);
        if template_name.is_empty() {
            return (String::new(), None);
        }

        let namespace = pod
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string());

        let key = format!("{}/{}", namespace, template_name);
        let template = self.template_lister.get(&namespace, &template_name);
        (key, template)
    }

    /// Pod informer add callback
    pub fn on_add(&self, pod: &Pod) {
        self.update_cache(None, pod);
    }

    /// Pod informer update callback: re-home the pod when its node
    /// assignment or its template label changes
    pub fn on_update(&self, old_pod: &Pod, new_pod: &Pod) {
        if node_name(old_pod) != node_name(new_pod)
            || usage_template_label(old_pod) != usage_template_label(new_pod)
        {
            self.update_cache(Some(old_pod), new_pod);
        }
    }

    /// Pod informer delete callback
    pub fn on_delete(&self, pod: &Pod) {
        self.delete_from_cache_if_exists(pod, &node_name(pod));
    }

    fn update_cache(&self, old_pod: Option<&Pod>, pod: &Pod) {
        if !is_assigned(pod) {
            return;
        }
        if let Some(old) = old_pod {
            self.on_delete(old);
        }
        self.add_to_cache_if_not_exists(pod, &node_name(pod));
    }

    pub fn add_to_cache_if_not_exists(&self, pod: &Pod, node: &str) {
        let namespaced = NamespacedPod::new(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );
        let mut cache = self.node_pods.write().unwrap();
        let entry = cache.entry(node.to_string()).or_default();
        if !entry.contains(&namespaced) {
            entry.push(namespaced);
        }
    }

    pub fn delete_from_cache_if_exists(&self, pod: &Pod, node: &str) {
        let mut cache = self.node_pods.write().unwrap();
        let Some(entry) = cache.get_mut(node) else {
            debug!(node, pod = ?pod.metadata.name, "node not found in cache");
            return;
        };
        entry.retain(|p| {
            !(p.name == pod.metadata.name.clone().unwrap_or_default()
                && p.namespace == pod.metadata.namespace.clone().unwrap_or_default())
        });
        if entry.is_empty() {
            cache.remove(node);
        }
    }

    /// Read-consistent snapshot of the pods assigned to a node
    pub fn get_node_pods(&self, node: &str) -> Vec<NamespacedPod> {
        self.node_pods
            .read()
            .unwrap()
            .get(node)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cache_size(&self) -> usize {
        self.node_pods.read().unwrap().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::{MemoryNodeInfoLister, MemoryPodLister, MemoryUsageTemplateLister};
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn manager() -> UsageTemplateManager {
        UsageTemplateManager::new(
            Arc::new(MemoryUsageTemplateLister::new()),
            Arc::new(MemoryPodLister::new()),
            Arc::new(MemoryNodeInfoLister::new()),
        )
    }

    fn assigned_pod(name: &str, node: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_delete_round_trip() {
        let mgr = manager();
        let pod = assigned_pod("pod-1", "node-1");

        mgr.on_add(&pod);
        assert_eq!(mgr.get_node_pods("node-1").len(), 1);
        assert_eq!(mgr.cache_size(), 1);

        mgr.on_delete(&pod);
        assert!(mgr.get_node_pods("node-1").is_empty());
        assert_eq!(mgr.cache_size(), 0);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mgr = manager();
        let pod = assigned_pod("pod-1", "node-1");
        mgr.on_add(&pod);
        mgr.on_add(&pod);
        assert_eq!(mgr.get_node_pods("node-1").len(), 1);
    }

    #[test]
    fn test_update_rehomes_pod_on_node_change() {
        let mgr = manager();
        let old = assigned_pod("pod-1", "node-1");
        let new = assigned_pod("pod-1", "node-2");

        mgr.on_add(&old);
        mgr.on_update(&old, &new);

        assert!(mgr.get_node_pods("node-1").is_empty());
        assert_eq!(mgr.get_node_pods("node-2").len(), 1);
        assert_eq!(mgr.cache_size(), 1);
    }

    #[test]
    fn test_update_rehomes_pod_on_label_change() {
        let mgr = manager();
        let old = assigned_pod("pod-1", "node-1");
        let mut new = assigned_pod("pod-1", "node-1");
        new.metadata.labels = Some(BTreeMap::from([(
            USAGE_TEMPLATE_LABEL.to_string(),
            "other-template".to_string(),
        )]));

        mgr.on_add(&old);
        mgr.on_update(&old, &new);
        assert_eq!(mgr.get_node_pods("node-1").len(), 1);
    }

    #[test]
    fn test_unassigned_pod_is_ignored() {
        let mgr = manager();
        let mut pod = assigned_pod("pod-1", "node-1");
        pod.spec.as_mut().unwrap().node_name = None;
        mgr.on_add(&pod);
        assert_eq!(mgr.cache_size(), 0);
    }
}

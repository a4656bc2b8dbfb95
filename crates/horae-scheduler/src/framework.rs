//! Narrow scheduling-framework surface
//!
//! The orchestrator's scheduling pipeline is an external collaborator; the
//! plugin only needs the cycle state, node snapshot and status types below.

use crate::quantity;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

/// Maximum score a node can obtain after normalisation
pub const MAX_NODE_SCORE: i64 = 100;
/// Minimum score a node can obtain after normalisation
pub const MIN_NODE_SCORE: i64 = 0;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";
pub const RESOURCE_PODS: &str = "pods";

/// Verdict code of a plugin stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    Unschedulable,
    Error,
}

/// Status returned by filter and score stages. `None` from a stage means
/// success; a `Status` value carries the code and failure reasons.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn new(code: Code, reasons: Vec<String>) -> Self {
        Self { code, reasons }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(Code::Error, vec![msg.into()])
    }

    pub fn unschedulable(reasons: Vec<String>) -> Self {
        Self::new(Code::Unschedulable, reasons)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

/// Score assigned to one node for the pod being scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

/// One resource dimension a node cannot satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct InsufficientResource {
    pub resource_name: String,
    pub reason: String,
    pub requested: i64,
    pub used: i64,
    pub capacity: i64,
}

/// Requested or allocatable resources in scheduler-native units:
/// milli CPU, bytes of memory and ephemeral storage, counts for the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub milli_cpu: i64,
    pub memory: i64,
    pub ephemeral_storage: i64,
    pub allowed_pod_number: i64,
    pub scalar_resources: BTreeMap<String, i64>,
}

impl Resource {
    /// Accumulate a resource list into this resource
    pub fn add(&mut self, list: &BTreeMap<String, Quantity>) {
        for (name, q) in list {
            match name.as_str() {
                RESOURCE_CPU => self.milli_cpu += quantity::milli_value(q),
                RESOURCE_MEMORY => self.memory += quantity::value(q),
                RESOURCE_EPHEMERAL_STORAGE => self.ephemeral_storage += quantity::value(q),
                RESOURCE_PODS => self.allowed_pod_number += quantity::value(q),
                other => {
                    *self.scalar_resources.entry(other.to_string()).or_insert(0) +=
                        quantity::value(q);
                }
            }
        }
    }

    /// Take the component-wise maximum with a resource list
    pub fn set_max_resource(&mut self, list: &BTreeMap<String, Quantity>) {
        for (name, q) in list {
            match name.as_str() {
                RESOURCE_CPU => self.milli_cpu = self.milli_cpu.max(quantity::milli_value(q)),
                RESOURCE_MEMORY => self.memory = self.memory.max(quantity::value(q)),
                RESOURCE_EPHEMERAL_STORAGE => {
                    self.ephemeral_storage = self.ephemeral_storage.max(quantity::value(q))
                }
                RESOURCE_PODS => {
                    self.allowed_pod_number = self.allowed_pod_number.max(quantity::value(q))
                }
                other => {
                    let entry = self.scalar_resources.entry(other.to_string()).or_insert(0);
                    *entry = (*entry).max(quantity::value(q));
                }
            }
        }
    }
}

/// Snapshot of a node and the pods assigned to it
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    node: Option<Node>,
    pub pods: Vec<Pod>,
    pub allocatable: Resource,
    pub requested: Resource,
}

impl NodeInfo {
    pub fn new(pods: impl IntoIterator<Item = Pod>) -> Self {
        let mut info = Self::default();
        for pod in pods {
            info.add_pod(pod);
        }
        info
    }

    /// Attach the node object and derive allocatable from its status,
    /// falling back to capacity when allocatable is absent
    pub fn set_node(&mut self, node: Node) {
        if let Some(status) = &node.status {
            let list = status
                .allocatable
                .as_ref()
                .or(status.capacity.as_ref());
            if let Some(list) = list {
                let mut allocatable = Resource::default();
                allocatable.add(list);
                self.allocatable = allocatable;
            }
        }
        self.node = Some(node);
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn node_name(&self) -> String {
        self.node
            .as_ref()
            .and_then(|n| n.metadata.name.clone())
            .unwrap_or_default()
    }

    /// Node CPU capacity in millicores, from the node status capacity
    pub fn capacity_milli_cpu(&self) -> i64 {
        self.node
            .as_ref()
            .and_then(|n| n.status.as_ref())
            .and_then(|s| s.capacity.as_ref())
            .and_then(|c| c.get(RESOURCE_CPU))
            .map(quantity::milli_value)
            .unwrap_or(0)
    }

    /// Track a pod as assigned to this node, accumulating its requests
    pub fn add_pod(&mut self, pod: Pod) {
        let request = crate::fit::compute_pod_resource_request(&pod);
        self.requested.milli_cpu += request.milli_cpu;
        self.requested.memory += request.memory;
        self.requested.ephemeral_storage += request.ephemeral_storage;
        for (name, v) in request.scalar_resources {
            *self.requested.scalar_resources.entry(name).or_insert(0) += v;
        }
        self.pods.push(pod);
    }
}

/// Per-scheduling-cycle scratch space shared between extension points
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.storage.insert(key.to_string(), Box::new(value));
    }

    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.storage.get(key).and_then(|v| v.downcast_ref::<T>())
    }
}

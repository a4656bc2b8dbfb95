//! Kubernetes API types for Horae
//!
//! Contains the `UsageTemplate` custom resource, the supported-resource
//! tables shared between the evaluator and the scheduler plugin, and the
//! plugin configuration arguments.

pub mod plugin_args;
pub mod resources;
pub mod usage_template;

pub use plugin_args::TemporalUtilizationArgs;
pub use usage_template::{
    ConditionStatus, Conditions, ResourceUsage, ResourceUsages, Sample, UsageTemplate,
    UsageTemplateCondition, UsageTemplateSpec, UsageTemplateStatus,
};

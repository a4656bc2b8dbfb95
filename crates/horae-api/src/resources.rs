//! Supported resource tables
//!
//! Shared lookup tables between the usage evaluator and the scheduler
//! plugin: which Prometheus metric backs a resource kind, how to rate it,
//! which unit and scaling factor apply, and which node annotation carries
//! the overcommit ratio.

/// API group of the Horae resources
pub const GROUP: &str = "horae.dev";

/// Pod label selecting the UsageTemplate for a workload
pub const USAGE_TEMPLATE_LABEL: &str = "horae.dev/usage-template";

/// Node annotation carrying the CPU overcommit ratio.
/// The ratio starts from 0, i.e. 0.3 means 30% more resources are
/// considered allocatable. An annotation because it is not for filtering.
pub const NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION: &str = "horae.dev/cpu-overcommit-ratio";

pub const CPU_RESOURCE: &str = "cpu";
pub const MEMORY_RESOURCE: &str = "memory";

pub const DEFAULT_EVALUATION_PERIOD_HOURS: i32 = 6;
pub const DEFAULT_EVALUATION_WINDOW_DAYS: i16 = 14;

/// Prometheus metric backing a resource kind
pub fn metric_label(resource: &str) -> Option<&'static str> {
    match resource {
        CPU_RESOURCE => Some("container_cpu_usage_seconds_total"),
        _ => None,
    }
}

/// For counter-typed resources, the per-datapoint rate window
pub fn rate_time_window(resource: &str) -> Option<&'static str> {
    match resource {
        CPU_RESOURCE => Some("2m"),
        _ => None,
    }
}

/// For counter-typed resources, the range method wrapping the series
pub fn range_method(resource: &str) -> Option<&'static str> {
    match resource {
        CPU_RESOURCE => Some("rate"),
        _ => None,
    }
}

/// Baked-in filters per metric. The empty-container filter excludes the
/// cgroup hierarchy roots cAdvisor also reports.
pub fn metric_label_filters(metric: &str) -> &'static [&'static str] {
    match metric {
        "container_cpu_usage_seconds_total" => &[r#"container!="""#],
        _ => &[],
    }
}

/// Canonical unit of the emitted samples per resource
pub fn metric_unit(resource: &str) -> Option<&'static str> {
    match resource {
        CPU_RESOURCE => Some("millicore"),
        _ => None,
    }
}

/// Scaling factor from the metric's native unit to the canonical unit.
/// container_cpu_usage_seconds_total reports core seconds, i.e. 1 = 1000 millicore.
pub fn scaling_factor(resource: &str) -> Option<f64> {
    match resource {
        CPU_RESOURCE => Some(1000.0),
        _ => None,
    }
}

/// Canonical unit map for the scheduler's forecast values
pub fn forecast_unit(resource: &str) -> Option<&'static str> {
    match resource {
        CPU_RESOURCE => Some("millicore"),
        MEMORY_RESOURCE => Some("bytes"),
        _ => None,
    }
}

/// Overcommit annotations per resource
pub fn overcommit_annotations() -> &'static [(&'static str, &'static str)] {
    &[(CPU_RESOURCE, NODE_CPU_OVERCOMMIT_RATIO_ANNOTATION)]
}

/// Resources the evaluator currently knows how to evaluate
pub fn supported_resources() -> Vec<&'static str> {
    vec![CPU_RESOURCE]
}

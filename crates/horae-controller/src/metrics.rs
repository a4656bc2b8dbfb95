//! Prometheus metrics for the Horae controller
//!
//! Exports metrics for:
//! - Active template evaluations
//! - Total resources under evaluation
//! - Total custom resources by type and namespace

use horae_api::UsageTemplate;
use kube::ResourceExt;
use once_cell::sync::Lazy;
use prometheus::{register_gauge_vec, Encoder, GaugeVec, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;

const USAGE_TEMPLATE_TYPE: &str = "usage_template";
const DEFAULT_NAMESPACE: &str = "default";

/// Number of usage template evaluations that are active
pub static TEMPLATE_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "horae_usage_template_active",
        "Number of usage template evaluations that are active",
        &["namespace", "metric", "usageTemplate"]
    )
    .unwrap()
});

/// Total number of resources under evaluation by type
pub static RESOURCE_TOTALS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "horae_resource_totals",
        "Total number of resources under evaluation",
        &["type"]
    )
    .unwrap()
});

/// Total number of custom resources by type and namespace
pub static CRD_TOTALS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "horae_crd_totals",
        "Total number of custom resources by type and namespace",
        &["type", "namespace"]
    )
    .unwrap()
});

struct CrdMetricData {
    namespace: String,
    resources: Vec<String>,
}

static CRD_METRIC_DATA: Lazy<Mutex<HashMap<String, CrdMetricData>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Initialize all metrics (call at startup)
pub fn init_metrics() {
    let _ = &*TEMPLATE_ACTIVE;
    let _ = &*RESOURCE_TOTALS;
    let _ = &*CRD_TOTALS;
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

fn namespace_or_default(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

/// Refresh the CRD and resource totals when a template is reconciled.
/// Prior bookkeeping for the same key is decremented first so generation
/// changes do not double count.
pub fn on_template_reconciled(ut: &UsageTemplate, namespaced_name: &str) {
    let mut data = CRD_METRIC_DATA.lock().unwrap();

    if let Some(previous) = data.get(namespaced_name) {
        CRD_TOTALS
            .with_label_values(&[USAGE_TEMPLATE_TYPE, namespace_or_default(&previous.namespace)])
            .dec();
        for resource in &previous.resources {
            RESOURCE_TOTALS.with_label_values(&[resource]).dec();
        }
    }

    let namespace = ut.namespace().unwrap_or_default();
    CRD_TOTALS
        .with_label_values(&[USAGE_TEMPLATE_TYPE, namespace_or_default(&namespace)])
        .inc();
    for resource in &ut.spec.resources {
        RESOURCE_TOTALS.with_label_values(&[resource]).inc();
    }

    data.insert(
        namespaced_name.to_string(),
        CrdMetricData {
            namespace,
            resources: ut.spec.resources.clone(),
        },
    );
}

/// Drop the bookkeeping for a deleted template
pub fn on_template_deleted(namespaced_name: &str) {
    let mut data = CRD_METRIC_DATA.lock().unwrap();
    if let Some(previous) = data.remove(namespaced_name) {
        CRD_TOTALS
            .with_label_values(&[USAGE_TEMPLATE_TYPE, namespace_or_default(&previous.namespace)])
            .dec();
        for resource in &previous.resources {
            RESOURCE_TOTALS.with_label_values(&[resource]).dec();
        }
    }
}

pub fn template_evaluation_started(ut: &UsageTemplate) {
    let namespace = ut.namespace().unwrap_or_default();
    let name = ut.name_any();
    for resource in &ut.spec.resources {
        TEMPLATE_ACTIVE
            .with_label_values(&[namespace_or_default(&namespace), resource, &name])
            .set(1.0);
    }
}

pub fn template_evaluation_stopped(ut: &UsageTemplate) {
    let namespace = ut.namespace().unwrap_or_default();
    let name = ut.name_any();
    for resource in &ut.spec.resources {
        TEMPLATE_ACTIVE
            .with_label_values(&[namespace_or_default(&namespace), resource, &name])
            .set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horae_api::UsageTemplateSpec;

    fn template(name: &str, namespace: &str, resources: &[&str]) -> UsageTemplate {
        let mut ut = UsageTemplate::new(
            name,
            UsageTemplateSpec {
                enabled: true,
                resources: resources.iter().map(|r| r.to_string()).collect(),
                ..Default::default()
            },
        );
        ut.metadata.namespace = Some(namespace.to_string());
        ut
    }

    #[test]
    fn test_reconcile_then_delete_returns_to_zero() {
        init_metrics();
        let ut = template("metrics-test", "metrics-ns", &["cpu"]);
        let key = "metrics-ns/metrics-test";

        on_template_reconciled(&ut, key);
        let after_add = CRD_TOTALS
            .with_label_values(&[USAGE_TEMPLATE_TYPE, "metrics-ns"])
            .get();

        // a second reconcile of the same key does not double count
        on_template_reconciled(&ut, key);
        assert_eq!(
            CRD_TOTALS
                .with_label_values(&[USAGE_TEMPLATE_TYPE, "metrics-ns"])
                .get(),
            after_add
        );

        on_template_deleted(key);
        assert_eq!(
            CRD_TOTALS
                .with_label_values(&[USAGE_TEMPLATE_TYPE, "metrics-ns"])
                .get(),
            after_add - 1.0
        );
    }
}

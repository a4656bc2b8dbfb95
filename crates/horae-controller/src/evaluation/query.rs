//! PromQL query construction
//!
//! Builds the range query for one resource kind: base metric, user plus
//! baked-in filters, a rate wrapper for counter metrics, and optionally a
//! group_left join pulling supplemental labels off a sibling series.

use horae_api::resources::{metric_label, metric_label_filters, range_method, rate_time_window};
use horae_common::HoraeError;

/// Build the usage query for a resource.
///
/// cAdvisor only assigns whitelisted labels to the top level "pause"
/// container, so when join labels are requested the usage series is joined
/// with its own metric to pull those labels back in:
/// `avg by (part_of,container) (rate(container_cpu_usage_seconds_total{container="nginx"}[2m]) + on (namespace,pod) group_left(part_of) (0 * container_cpu_usage_seconds_total{part_of!="",namespace="default"}))`
pub fn build_usage_query(
    filters: &[String],
    resource: &str,
    join_filters: &[String],
    join_labels: &[String],
) -> Result<String, HoraeError> {
    let metric = metric_label(resource)
        .ok_or_else(|| HoraeError::UnsupportedResource(resource.to_string()))?;

    let mut rate_filters: Vec<String> = filters.to_vec();
    rate_filters.extend(metric_label_filters(metric).iter().map(|f| f.to_string()));

    let mut query = metric.to_string();

    if !rate_filters.is_empty() {
        query = format!("{}{{{}}}", query, rate_filters.join(","));
    }

    // only wrap when the resource has both a method and a window
    if let (Some(method), Some(window)) = (range_method(resource), rate_time_window(resource)) {
        query = format!("{}({}[{}])", method, query, window);
    }

    if !join_filters.is_empty() && !join_labels.is_empty() {
        let labels = join_labels.join(",");
        query = format!(
            "avg by ({},container) ({} + on (namespace,pod) group_left({}) (0 * {}{{{}}}))",
            labels,
            query,
            labels,
            metric,
            join_filters.join(",")
        );
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_cpu_query() {
        let query = build_usage_query(&[], "cpu", &[], &[]).unwrap();
        assert_eq!(
            query,
            r#"rate(container_cpu_usage_seconds_total{container!=""}[2m])"#
        );
    }

    #[test]
    fn test_user_filters_are_prepended() {
        let filters = vec![r#"container="nginx-random""#.to_string()];
        let query = build_usage_query(&filters, "cpu", &[], &[]).unwrap();
        assert_eq!(
            query,
            r#"rate(container_cpu_usage_seconds_total{container="nginx-random",container!=""}[2m])"#
        );
    }

    #[test]
    fn test_join_query_shape() {
        let filters = vec![r#"container="nginx-random""#.to_string()];
        let join_filters = vec![r#"part_of!="""#.to_string(), r#"namespace="default""#.to_string()];
        let join_labels = vec!["part_of".to_string()];
        let query = build_usage_query(&filters, "cpu", &join_filters, &join_labels).unwrap();
        assert_eq!(
            query,
            r#"avg by (part_of,container) (rate(container_cpu_usage_seconds_total{container="nginx-random",container!=""}[2m]) + on (namespace,pod) group_left(part_of) (0 * container_cpu_usage_seconds_total{part_of!="",namespace="default"}))"#
        );
    }

    #[test]
    fn test_join_requires_both_labels_and_filters() {
        let join_labels = vec!["part_of".to_string()];
        let query = build_usage_query(&[], "cpu", &[], &join_labels).unwrap();
        assert!(!query.starts_with("avg by"));
    }

    #[test]
    fn test_unsupported_resource() {
        let err = build_usage_query(&[], "nvidia.com/gpu", &[], &[]).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_RESOURCE");
    }
}

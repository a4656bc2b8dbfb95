//! Custom Resource Definition for Horae
//!
//! A `UsageTemplate` binds a workload class (selected by pod label) to a
//! historical-usage query and an evaluation cadence. The evaluator writes
//! the per-hour usage profile back onto the status.

use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// UsageTemplate Custom Resource
///
/// The controller watches for UsageTemplate resources, validates them and
/// drives a periodic evaluation loop per template. The scheduler plugin
/// reads `status.historicalUsage` to compose per-node forecasts.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "horae.dev",
    version = "v1alpha1",
    kind = "UsageTemplate",
    plural = "usagetemplates",
    shortname = "ut",
    status = "UsageTemplateStatus",
    namespaced,
    printcolumn = r#"{"name":"Enabled","type":"boolean","jsonPath":".spec.enabled"}"#,
    printcolumn = r#"{"name":"LongRunning","type":"boolean","jsonPath":".status.isLongRunning"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UsageTemplateSpec {
    /// Whether the scheduler should use the evaluated values for scheduling
    #[serde(default)]
    pub enabled: bool,

    /// Desired evaluation period in hours, defaults to 6
    pub evaluate_period_hours: Option<i32>,

    /// Desired evaluation window in days, defaults to 14, bounded to [1, 14]
    pub evaluation_window_days: Option<i16>,

    /// Resources to evaluate, currently supports cpu
    #[serde(default)]
    pub resources: Vec<String>,

    /// Metric label filters selecting the application pods, e.g. `k="v"`, `k!="v"`.
    /// Plain strings rather than a label selector because a few selector
    /// expressions have no Prometheus equivalent.
    #[serde(default)]
    pub filters: Vec<String>,

    /// Labels to join back from a sibling series when the usage series does
    /// not carry them itself (cAdvisor whitelisted labels live on the top
    /// level "pause" container only)
    #[serde(default)]
    pub join_labels: Vec<String>,

    /// Filters applied to the right-hand side of the join
    #[serde(default)]
    pub join_filters: Vec<String>,

    /// Kubernetes quality of service class of the workload:
    /// Guaranteed, Burstable or BestEffort
    #[serde(default)]
    pub quality_of_service_class: String,
}

/// Sample contains the estimated usage for one hour slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Hour of the day, indexed from 0
    pub hour: i32,
    /// The estimated value, stringified
    pub value: String,
    /// Which percentile the value was taken at
    pub percentile: String,
    /// Unit of the value, e.g. millicore
    pub unit: String,
    /// Whether this sample belongs to the weekday profile
    #[serde(default)]
    pub is_weekday: bool,
}

/// Historical usage of a single resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Name of the resource
    pub resource: String,
    /// Per-hour samples for the resource
    pub usages: Vec<Sample>,
}

/// Evaluated historical usage per resource
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsages {
    #[serde(default)]
    pub items: Vec<ResourceUsage>,
}

/// Status of the condition, following the metav1 convention
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Ready-for-Evaluation condition type
pub const READY_FOR_EVALUATION: &str = "ReadyForEvaluation";

/// Reason set on the Ready condition when the template is ready for evaluation
pub const READY_FOR_EVALUATION_SUCCESS_REASON: &str = "UsageTemplateReady";
/// Reason set on the Ready condition when the template is disabled
pub const DISABLED_SUCCESS_REASON: &str = "UsageTemplateDisabled";
/// Reason set on the Ready condition when validation failed
pub const CHECK_FAILED_REASON: &str = "UsageTemplateCheckFailed";

/// State of a UsageTemplate at a certain point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageTemplateCondition {
    /// Condition type, currently only ReadyForEvaluation
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition, one of True, False, Unknown
    pub status: ConditionStatus,
    /// Last time the condition transitioned from one status to another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition's last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable explanation of the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// List of conditions maintained on the status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(pub Vec<UsageTemplateCondition>);

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a ReadyForEvaluation condition has been recorded
    pub fn are_ready(&self) -> bool {
        self.0.iter().any(|c| c.type_ == READY_FOR_EVALUATION)
    }

    pub fn get_ready_condition(&self) -> Option<&UsageTemplateCondition> {
        self.0.iter().find(|c| c.type_ == READY_FOR_EVALUATION)
    }

    /// Set the ReadyForEvaluation condition, appending it if absent
    pub fn set_ready_condition(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        let now = Utc::now().to_rfc3339();
        for cond in &mut self.0 {
            if cond.type_ == READY_FOR_EVALUATION {
                cond.status = status;
                cond.reason = Some(reason.to_string());
                cond.message = Some(message.to_string());
                cond.last_transition_time = Some(now);
                return;
            }
        }
        self.0.push(UsageTemplateCondition {
            type_: READY_FOR_EVALUATION.to_string(),
            status,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_transition_time: Some(now),
        });
    }
}

/// Runtime state of a UsageTemplate
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageTemplateStatus {
    /// The most recent evaluation conducted by the evaluator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_usage: Option<ResourceUsages>,
    /// Conditions required for this template
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    /// Whether this application is long running, defined as longer than 24 hours
    #[serde(default)]
    pub is_long_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_set_and_get() {
        let mut conds = Conditions::default();
        assert!(!conds.are_ready());

        conds.set_ready_condition(ConditionStatus::Unknown, "Initialized", "first sight");
        assert!(conds.are_ready());
        assert_eq!(
            conds.get_ready_condition().unwrap().status,
            ConditionStatus::Unknown
        );

        conds.set_ready_condition(
            ConditionStatus::True,
            READY_FOR_EVALUATION_SUCCESS_REASON,
            "",
        );
        assert_eq!(conds.0.len(), 1);
        assert_eq!(
            conds.get_ready_condition().unwrap().reason.as_deref(),
            Some(READY_FOR_EVALUATION_SUCCESS_REASON)
        );
    }

    #[test]
    fn test_spec_defaults_from_json() {
        let spec: UsageTemplateSpec = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "resources": ["cpu"],
            "filters": ["pod=~\"web-.*\""],
        }))
        .unwrap();
        assert!(spec.enabled);
        assert!(spec.evaluate_period_hours.is_none());
        assert!(spec.join_labels.is_empty());
    }

    #[test]
    fn test_status_round_trip() {
        let status = UsageTemplateStatus {
            historical_usage: Some(ResourceUsages {
                items: vec![ResourceUsage {
                    resource: "cpu".into(),
                    usages: vec![Sample {
                        hour: 3,
                        value: "120.5".into(),
                        percentile: "0.95".into(),
                        unit: "millicore".into(),
                        is_weekday: true,
                    }],
                }],
            }),
            conditions: Conditions::default(),
            is_long_running: true,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isLongRunning"], true);
        let back: UsageTemplateStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }
}

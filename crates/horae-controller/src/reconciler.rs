//! Reconciliation logic for UsageTemplate resources
//!
//! Validates the spec, manages the finalizer and Ready condition, and
//! drives the evaluator's handle/delete lifecycle. A generation map
//! suppresses redundant handles when only the status changed.

use crate::evaluation::UsageEvaluator;
use crate::events;
use crate::metrics;
use crate::status::update_ready_condition;
use dashmap::DashMap;
use horae_api::resources::{metric_label, supported_resources};
use horae_api::usage_template::{
    ConditionStatus, DISABLED_SUCCESS_REASON, CHECK_FAILED_REASON,
    READY_FOR_EVALUATION_SUCCESS_REASON,
};
use horae_api::UsageTemplate;
use horae_common::HoraeError;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

pub const USAGE_TEMPLATE_FINALIZER: &str = "finalizer.horae.dev";

/// Reconciler context
pub struct Context {
    pub client: Client,
    pub evaluator: Arc<UsageEvaluator>,
    /// key -> last generation an evaluation loop was started for
    pub generations: DashMap<String, i64>,
}

fn namespaced_key(ut: &UsageTemplate) -> String {
    format!(
        "{}/{}",
        ut.namespace().unwrap_or_else(|| "default".to_string()),
        ut.name_any()
    )
}

fn template_api(client: &Client, ut: &UsageTemplate) -> Api<UsageTemplate> {
    let namespace = ut.namespace().unwrap_or_else(|| "default".to_string());
    Api::namespaced(client.clone(), &namespace)
}

/// Reconcile a UsageTemplate
#[instrument(skip(ut, ctx), fields(template = %ut.name_any()))]
pub async fn reconcile(ut: Arc<UsageTemplate>, ctx: Arc<Context>) -> Result<Action, HoraeError> {
    let key = namespaced_key(&ut);
    info!(template = %key, "reconciling UsageTemplate");

    // Finalization logic
    if ut.metadata.deletion_timestamp.is_some() {
        finalize_usage_template(&ut, &ctx, &key).await?;
        return Ok(Action::await_change());
    }

    metrics::on_template_reconciled(&ut, &key);

    ensure_finalizer(&ut, &ctx).await?;

    // first sight: record an Unknown Ready condition
    let conditions_ready = ut
        .status
        .as_ref()
        .map(|s| s.conditions.are_ready())
        .unwrap_or(false);
    if !conditions_ready {
        update_ready_condition(
            &ctx.client,
            &ut,
            ConditionStatus::Unknown,
            "InitializedCondition",
            "Initialized",
        )
        .await?;
    }

    match reconcile_usage_template(&ut, &ctx, &key).await {
        Err((msg, err)) => {
            error!(%err, template = %key, reason = events::CHECK_FAILED, "{}", msg);
            update_ready_condition(&ctx.client, &ut, ConditionStatus::False, CHECK_FAILED_REASON, &msg)
                .await?;
        }
        Ok(reason) if !ut.spec.enabled => {
            update_ready_condition(&ctx.client, &ut, ConditionStatus::True, reason, "UsageTemplate is disabled")
                .await?;
        }
        Ok(reason) => {
            update_ready_condition(&ctx.client, &ut, ConditionStatus::True, reason, "").await?;
        }
    }

    Ok(Action::await_change())
}

/// Error handler for the controller
pub fn error_policy(_ut: Arc<UsageTemplate>, error: &HoraeError, _ctx: Arc<Context>) -> Action {
    error!(%error, "reconciliation error");
    Action::requeue(Duration::from_secs(30))
}

async fn reconcile_usage_template(
    ut: &UsageTemplate,
    ctx: &Context,
    key: &str,
) -> Result<&'static str, (String, HoraeError)> {
    if !ut.spec.enabled {
        ctx.evaluator.delete_usage_template_evaluation(ut);
        return Ok(DISABLED_SUCCESS_REASON);
    }

    validate_usage_resource_targets(ut)?;
    validate_evaluation_periods(ut)?;

    if usage_template_generation_changed(ut, &ctx.generations, key) {
        info!(template = %key, reason = events::READY_FOR_EVALUATION, "starting evaluation loop according to spec");
        ctx.evaluator.handle_usage_template(ut);
        ctx.generations
            .insert(key.to_string(), ut.metadata.generation.unwrap_or_default());
    }

    Ok(READY_FOR_EVALUATION_SUCCESS_REASON)
}

pub fn validate_usage_resource_targets(ut: &UsageTemplate) -> Result<(), (String, HoraeError)> {
    if ut.spec.resources.is_empty() {
        return Err((
            "No resources specified".to_string(),
            HoraeError::ValidationFailed("expect at least one resource specified".to_string()),
        ));
    }

    for resource in &ut.spec.resources {
        if metric_label(resource).is_none() {
            return Err((
                "Resource not supported".to_string(),
                HoraeError::ValidationFailed(format!(
                    "resource {} not supported yet, currently only supports {:?}",
                    resource,
                    supported_resources()
                )),
            ));
        }
    }

    Ok(())
}

pub fn validate_evaluation_periods(ut: &UsageTemplate) -> Result<(), (String, HoraeError)> {
    if let Some(hours) = ut.spec.evaluate_period_hours {
        if hours < 1 {
            return Err((
                "EvaluatePeriodHours out of range".to_string(),
                HoraeError::ValidationFailed(
                    "expect evaluate period hours to be greater than 0".to_string(),
                ),
            ));
        }
    }

    if let Some(days) = ut.spec.evaluation_window_days {
        if !(1..=14).contains(&days) {
            return Err((
                "EvaluationWindowDays out of range".to_string(),
                HoraeError::ValidationFailed(
                    "expect evaluation window days to be between [1,14]".to_string(),
                ),
            ));
        }
    }

    Ok(())
}

fn usage_template_generation_changed(
    ut: &UsageTemplate,
    generations: &DashMap<String, i64>,
    key: &str,
) -> bool {
    match generations.get(key) {
        Some(last) => *last != ut.metadata.generation.unwrap_or_default(),
        None => true,
    }
}

async fn ensure_finalizer(ut: &UsageTemplate, ctx: &Context) -> Result<(), HoraeError> {
    let finalizers = ut.metadata.finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == USAGE_TEMPLATE_FINALIZER) {
        return Ok(());
    }

    let mut updated = finalizers;
    updated.push(USAGE_TEMPLATE_FINALIZER.to_string());

    let api = template_api(&ctx.client, ut);
    let patch = serde_json::json!({ "metadata": { "finalizers": updated } });
    api.patch(&ut.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|err| HoraeError::KubernetesError(err.to_string()))?;

    Ok(())
}

async fn finalize_usage_template(
    ut: &UsageTemplate,
    ctx: &Context,
    key: &str,
) -> Result<(), HoraeError> {
    let finalizers = ut.metadata.finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == USAGE_TEMPLATE_FINALIZER) {
        ctx.evaluator.delete_usage_template_evaluation(ut);
        ctx.generations.remove(key);

        let remaining: Vec<String> = finalizers
            .into_iter()
            .filter(|f| f != USAGE_TEMPLATE_FINALIZER)
            .collect();

        let api = template_api(&ctx.client, ut);
        let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
        api.patch(&ut.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| HoraeError::KubernetesError(err.to_string()))?;

        metrics::on_template_deleted(key);
    }

    info!(template = %key, reason = events::DELETED, "successfully finalized UsageTemplate");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use horae_api::UsageTemplateSpec;

    fn template_with(spec: UsageTemplateSpec) -> UsageTemplate {
        UsageTemplate::new("test", spec)
    }

    #[test]
    fn test_empty_resources_rejected() {
        let ut = template_with(UsageTemplateSpec {
            enabled: true,
            ..Default::default()
        });
        assert!(validate_usage_resource_targets(&ut).is_err());
    }

    #[test]
    fn test_unsupported_resource_rejected() {
        let ut = template_with(UsageTemplateSpec {
            enabled: true,
            resources: vec!["cpu".into(), "nvidia.com/gpu".into()],
            ..Default::default()
        });
        assert!(validate_usage_resource_targets(&ut).is_err());
    }

    #[test]
    fn test_cpu_resource_accepted() {
        let ut = template_with(UsageTemplateSpec {
            enabled: true,
            resources: vec!["cpu".into()],
            ..Default::default()
        });
        assert!(validate_usage_resource_targets(&ut).is_ok());
    }

    #[test]
    fn test_window_bounds() {
        for (days, ok) in [(0i16, false), (1, true), (14, true), (15, false)] {
            let ut = template_with(UsageTemplateSpec {
                evaluation_window_days: Some(days),
                ..Default::default()
            });
            assert_eq!(validate_evaluation_periods(&ut).is_ok(), ok, "days={}", days);
        }
    }

    #[test]
    fn test_period_bounds() {
        let ut = template_with(UsageTemplateSpec {
            evaluate_period_hours: Some(0),
            ..Default::default()
        });
        assert!(validate_evaluation_periods(&ut).is_err());

        let ut = template_with(UsageTemplateSpec {
            evaluate_period_hours: Some(6),
            ..Default::default()
        });
        assert!(validate_evaluation_periods(&ut).is_ok());
    }

    #[test]
    fn test_unset_periods_are_valid() {
        let ut = template_with(UsageTemplateSpec::default());
        assert!(validate_evaluation_periods(&ut).is_ok());
    }

    #[test]
    fn test_generation_gating_suppresses_redundant_handles() {
        let mut ut = template_with(UsageTemplateSpec {
            enabled: true,
            resources: vec!["cpu".into()],
            ..Default::default()
        });
        ut.metadata.generation = Some(1);
        let generations = DashMap::new();
        let key = "default/test";

        assert!(usage_template_generation_changed(&ut, &generations, key));
        generations.insert(key.to_string(), 1);
        assert!(!usage_template_generation_changed(&ut, &generations, key));

        ut.metadata.generation = Some(2);
        assert!(usage_template_generation_changed(&ut, &generations, key));
    }
}

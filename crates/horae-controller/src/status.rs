//! UsageTemplate status patch helpers

use horae_api::usage_template::ConditionStatus;
use horae_api::UsageTemplate;
use horae_common::HoraeError;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::trace;

/// Set the Ready condition on a template and patch its status
pub async fn update_ready_condition(
    client: &Client,
    ut: &UsageTemplate,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> Result<(), HoraeError> {
    let mut conditions = ut
        .status
        .clone()
        .unwrap_or_default()
        .conditions;
    conditions.set_ready_condition(status, reason, message);

    trace!(template = %ut.name_any(), ?status, reason, "set status condition");

    let namespace = ut.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<UsageTemplate> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": { "conditions": conditions } });
    api.patch_status(&ut.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|err| HoraeError::KubernetesError(err.to_string()))?;

    Ok(())
}

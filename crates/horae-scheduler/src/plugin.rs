//! The TemporalUtilization scheduling plugin
//!
//! PreFilter computes and stashes the pod's declared request. Filter runs
//! either the classic capacity check (with optional overcommit allowances)
//! or the temporal check over the node's composed 48-hour forecast. Score
//! rates nodes against the hotspot threshold, NormalizeScore rescales to
//! the framework's range, and Reserve/Unreserve maintain the node/pod
//! cache.

use crate::cache::UsageTemplateManager;
use crate::fit::{compute_pod_resource_request, fits_request, fits_request_with_temporal};
use crate::forecast::{check_insufficient_resources, get_forecasts_by_pod, obtain_forecasts};
use crate::framework::{CycleState, NodeInfo, NodeScore, Resource, Status, MAX_NODE_SCORE, MIN_NODE_SCORE};
use crate::overcommit::calculate_overcommit_resources;
use crate::scorer::score_node;
use chrono::{Timelike, Utc};
use horae_api::resources::{overcommit_annotations, supported_resources};
use horae_api::TemporalUtilizationArgs;
use horae_common::HoraeError;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Plugin name, also the prefix of its cycle-state key
pub const NAME: &str = "TemporalUtilization";

const PRE_FILTER_STATE_KEY: &str = "PreFilterTemporalUtilization";

/// Fallback hotspot threshold when the configured value is out of range:
/// the whole machine.
pub const FALLBACK_HOT_SPOT_THRESHOLD: i32 = 100;

pub struct TemporalUtilization {
    pub hot_spot_threshold: i32,
    pub hard_threshold: bool,
    pub enable_overcommit: bool,
    pub filter_by_temporal_usages: bool,
    manager: Arc<UsageTemplateManager>,
}

impl TemporalUtilization {
    pub fn new(args: &TemporalUtilizationArgs, manager: Arc<UsageTemplateManager>) -> Self {
        // HotSpotThreshold must be greater than 0 and at most 100
        let hot_spot_threshold = if args.hot_spot_threshold > 0 && args.hot_spot_threshold <= 100 {
            args.hot_spot_threshold
        } else {
            error!(
                threshold = args.hot_spot_threshold,
                "expected threshold between one and a hundred, using default of 100"
            );
            FALLBACK_HOT_SPOT_THRESHOLD
        };

        Self {
            hot_spot_threshold,
            hard_threshold: args.hard_threshold,
            enable_overcommit: args.enable_overcommit,
            filter_by_temporal_usages: args.filter_by_temporal_usages,
            manager,
        }
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn supported_target_resources(&self) -> Vec<&'static str> {
        supported_resources()
    }

    fn current_hour() -> i64 {
        Utc::now().hour() as i64
    }

    /// Compute the pod resource request and stash it in the cycle state
    pub fn pre_filter(&self, cycle_state: &mut CycleState, pod: &Pod) -> Option<Status> {
        cycle_state.write(PRE_FILTER_STATE_KEY, compute_pod_resource_request(pod));
        None
    }

    fn pre_filter_state<'a>(&self, cycle_state: &'a CycleState) -> Result<&'a Resource, Status> {
        cycle_state
            .read::<Resource>(PRE_FILTER_STATE_KEY)
            .ok_or_else(|| {
                Status::error(format!(
                    "error reading {:?} from cycle state",
                    PRE_FILTER_STATE_KEY
                ))
            })
    }

    /// Clone the node info, applying overcommit allowances to allocatable
    /// when enabled
    fn prepare_node_info_for_filter(&self, node_info: &NodeInfo) -> Result<NodeInfo, HoraeError> {
        let mut clone = node_info.clone();
        if !self.enable_overcommit {
            return Ok(clone);
        }

        let allowances = calculate_overcommit_resources(node_info, overcommit_annotations())?;
        clone.allocatable.add(&allowances);

        debug!(node = %node_info.node_name(), allocatable = ?clone.allocatable, "overcommitable");
        Ok(clone)
    }

    fn filter_with_fit(
        &self,
        cycle_state: &CycleState,
        _pod: &Pod,
        node_info: &NodeInfo,
    ) -> Option<Status> {
        let pod_request = match self.pre_filter_state(cycle_state) {
            Ok(r) => r,
            Err(status) => return Some(status),
        };

        let clone = match self.prepare_node_info_for_filter(node_info) {
            Ok(c) => c,
            Err(err) => {
                return Some(Status::error(format!(
                    "node {}: {}",
                    node_info.node_name(),
                    err
                )))
            }
        };

        check_insufficient_resources(fits_request(pod_request, &clone, &HashSet::new()))
    }

    fn ignored_resources(&self) -> HashSet<String> {
        self.supported_target_resources()
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn filter_with_temporal_usages(
        &self,
        cycle_state: &CycleState,
        pod: &Pod,
        node_info: &NodeInfo,
    ) -> Option<Status> {
        let pod_request = match self.pre_filter_state(cycle_state) {
            Ok(r) => r,
            Err(status) => return Some(status),
        };

        let clone = match self.prepare_node_info_for_filter(node_info) {
            Ok(c) => c,
            Err(err) => {
                return Some(Status::error(format!(
                    "node {}: {}",
                    node_info.node_name(),
                    err
                )))
            }
        };

        // other resources are checked against capacity as usual
        let insufficient = fits_request(pod_request, &clone, &self.ignored_resources());
        if let Some(status) = check_insufficient_resources(insufficient) {
            return Some(status);
        }

        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let targets = self.supported_target_resources();
        let current_hour = Self::current_hour();

        let pod_temporal_usages =
            match get_forecasts_by_pod(&self.manager, namespace, name, &targets, current_hour) {
                Ok(usages) => usages,
                Err(_) => {
                    return Some(Status::error(format!(
                        "unable to obtain usage template for pod: {}/{}",
                        namespace, name
                    )))
                }
            };

        let forecasts = match obtain_forecasts(
            &self.manager,
            &clone.node_name(),
            pod,
            &targets,
            current_hour,
        ) {
            Ok(forecasts) => forecasts,
            Err(err) => {
                return Some(Status::error(format!(
                    "summing pod usages for node {:?}: {}",
                    clone.node_name(),
                    err
                )))
            }
        };

        check_insufficient_resources(fits_request_with_temporal(
            &pod_temporal_usages,
            &forecasts,
            &clone,
        ))
    }

    /// Filter a (pod, node) candidate. `None` means the node passes.
    pub fn filter(
        &self,
        cycle_state: &CycleState,
        pod: &Pod,
        node_info: &NodeInfo,
    ) -> Option<Status> {
        if self.filter_by_temporal_usages {
            self.filter_with_temporal_usages(cycle_state, pod, node_info)
        } else {
            self.filter_with_fit(cycle_state, pod, node_info)
        }
    }

    /// Score a node for the pod from the composed forecast
    pub fn score(&self, _cycle_state: &CycleState, pod: &Pod, node_name: &str) -> Result<i64, Status> {
        let node_info = self
            .manager
            .snapshot()
            .get(node_name)
            .ok_or_else(|| Status::error(format!("getting node {:?} from snapshot", node_name)))?;

        let targets = self.supported_target_resources();
        let forecasts = obtain_forecasts(
            &self.manager,
            node_name,
            pod,
            &targets,
            Self::current_hour(),
        )
        .map_err(|err| Status::error(format!("summing pod usages for node {:?}: {}", node_name, err)))?;

        let score = score_node(
            &node_info,
            &forecasts,
            self.hot_spot_threshold,
            self.hard_threshold,
        )?;

        debug!(score, node = node_name, pod = ?pod.metadata.name, "temporal score");
        Ok(score)
    }

    /// Rescale the observed score range onto the framework's range.
    /// All-equal scores collapse to the minimum node score.
    pub fn normalize_score(&self, scores: &mut [NodeScore]) -> Option<Status> {
        let mut highest = i64::MIN;
        let mut lowest = i64::MAX;
        for node_score in scores.iter() {
            highest = highest.max(node_score.score);
            lowest = lowest.min(node_score.score);
        }

        let old_range = highest - lowest;
        let new_range = MAX_NODE_SCORE - MIN_NODE_SCORE;
        for node_score in scores.iter_mut() {
            if old_range == 0 {
                node_score.score = MIN_NODE_SCORE;
            } else {
                node_score.score =
                    (node_score.score - lowest) * new_range / old_range + MIN_NODE_SCORE;
            }
        }

        None
    }

    /// Track the pod as reserved on the node. Cannot fail.
    pub fn reserve(&self, _cycle_state: &CycleState, pod: &Pod, node_name: &str) -> Option<Status> {
        self.manager.add_to_cache_if_not_exists(pod, node_name);
        None
    }

    /// Remove the reservation again
    pub fn unreserve(&self, _cycle_state: &CycleState, pod: &Pod, node_name: &str) {
        self.manager.delete_from_cache_if_exists(pod, node_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_fallback_out_of_range() {
        let manager = Arc::new(UsageTemplateManager::new(
            Arc::new(crate::lister::MemoryUsageTemplateLister::new()),
            Arc::new(crate::lister::MemoryPodLister::new()),
            Arc::new(crate::lister::MemoryNodeInfoLister::new()),
        ));
        let args = TemporalUtilizationArgs {
            hot_spot_threshold: 0,
            ..Default::default()
        };
        let plugin = TemporalUtilization::new(&args, manager.clone());
        assert_eq!(plugin.hot_spot_threshold, 100);

        let args = TemporalUtilizationArgs {
            hot_spot_threshold: 101,
            ..Default::default()
        };
        let plugin = TemporalUtilization::new(&args, manager);
        assert_eq!(plugin.hot_spot_threshold, 100);
    }

    #[test]
    fn test_normalize_score_rescales_to_bounds() {
        let manager = Arc::new(UsageTemplateManager::new(
            Arc::new(crate::lister::MemoryUsageTemplateLister::new()),
            Arc::new(crate::lister::MemoryPodLister::new()),
            Arc::new(crate::lister::MemoryNodeInfoLister::new()),
        ));
        let plugin =
            TemporalUtilization::new(&TemporalUtilizationArgs::default(), manager);

        let mut scores = vec![
            NodeScore { name: "a".into(), score: 1440 },
            NodeScore { name: "b".into(), score: 3216 },
            NodeScore { name: "c".into(), score: 2160 },
        ];
        plugin.normalize_score(&mut scores);
        assert_eq!(scores[0].score, MIN_NODE_SCORE);
        assert_eq!(scores[1].score, MAX_NODE_SCORE);
        assert!(scores[2].score > MIN_NODE_SCORE && scores[2].score < MAX_NODE_SCORE);
    }

    #[test]
    fn test_normalize_score_all_equal_collapses_to_min() {
        let manager = Arc::new(UsageTemplateManager::new(
            Arc::new(crate::lister::MemoryUsageTemplateLister::new()),
            Arc::new(crate::lister::MemoryPodLister::new()),
            Arc::new(crate::lister::MemoryNodeInfoLister::new()),
        ));
        let plugin =
            TemporalUtilization::new(&TemporalUtilizationArgs::default(), manager);

        let mut scores = vec![
            NodeScore { name: "a".into(), score: 3216 },
            NodeScore { name: "b".into(), score: 3216 },
        ];
        plugin.normalize_score(&mut scores);
        assert!(scores.iter().all(|s| s.score == MIN_NODE_SCORE));
    }
}

//! The usage evaluator
//!
//! One background worker drains a min-heap of queued templates every 15
//! seconds. Each template owns a cancellation token in `loop_contexts`;
//! re-handling a template cancels its predecessor, so at most one live
//! evaluation context exists per template at any time.

use super::estimator::DateTimeEstimator;
use super::promclient::{Matrix, PromClient};
use super::query::build_usage_query;
use super::util::{
    add_shifted_weighted_samples_by_week, add_weighted_samples_by_week,
    find_max_week_and_check_long_running,
};
use crate::events;
use crate::metrics;
use crate::status::update_ready_condition;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use horae_api::usage_template::{ConditionStatus, ResourceUsage, ResourceUsages, Sample};
use horae_api::resources::{
    metric_unit, scaling_factor, DEFAULT_EVALUATION_PERIOD_HOURS, DEFAULT_EVALUATION_WINDOW_DAYS,
};
use horae_api::UsageTemplate;
use horae_common::HoraeError;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Interval of the evaluation worker tick
pub const EVALUATION_TICK: Duration = Duration::from_secs(15);

/// A template waiting in the evaluation queue
pub struct QueuedEvaluation {
    pub template: UsageTemplate,
    pub token: CancellationToken,
    /// Number of evaluations done
    pub counts: u64,
    /// Last successful evaluation timestamp
    pub last_evaluated: Option<DateTime<Utc>>,
    /// Next evaluation timestamp, set by the last cycle
    pub next_evaluation_time: DateTime<Utc>,
}

impl PartialEq for QueuedEvaluation {
    fn eq(&self, other: &Self) -> bool {
        self.next_evaluation_time == other.next_evaluation_time
    }
}

impl Eq for QueuedEvaluation {}

impl PartialOrd for QueuedEvaluation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvaluation {
    fn cmp(&self, other: &Self) -> Ordering {
        // earliest next evaluation first; BinaryHeap is a max-heap
        other.next_evaluation_time.cmp(&self.next_evaluation_time)
    }
}

fn namespaced_key(ut: &UsageTemplate) -> String {
    format!(
        "{}/{}",
        ut.namespace().unwrap_or_else(|| "default".to_string()),
        ut.name_any()
    )
}

pub struct UsageEvaluator {
    client: Client,
    /// One live cancellation handle per template key
    loop_contexts: DashMap<String, CancellationToken>,
    global_http_timeout: Duration,
    prom_client: PromClient,
    evaluation_resolution: Duration,
    heap: Mutex<BinaryHeap<QueuedEvaluation>>,
    shutdown: CancellationToken,
}

impl UsageEvaluator {
    pub fn new(
        client: Client,
        evaluation_resolution: Duration,
        global_http_timeout: Duration,
        prom_address: &str,
        shutdown: CancellationToken,
    ) -> Result<Self, HoraeError> {
        let prom_client = PromClient::new(prom_address).map_err(|err| {
            error!(%err, address = prom_address, "unable to create prometheus client");
            err
        })?;

        Ok(Self {
            client,
            loop_contexts: DashMap::new(),
            global_http_timeout,
            prom_client,
            evaluation_resolution,
            heap: Mutex::new(BinaryHeap::new()),
            shutdown,
        })
    }

    /// Start or restart the periodic evaluation of a template. Any prior
    /// context for the same key is cancelled first. The template is deep
    /// copied so later caller mutation cannot leak into the queue.
    pub fn handle_usage_template(&self, ut: &UsageTemplate) {
        let key = namespaced_key(ut);
        let token = self.shutdown.child_token();

        if let Some(old) = self.loop_contexts.insert(key.clone(), token.clone()) {
            old.cancel();
        } else {
            info!(template = %key, reason = events::EVALUATION_STARTED, "started periodic evaluation");
            metrics::template_evaluation_started(ut);
        }

        self.add_to_queue(QueuedEvaluation {
            template: ut.clone(),
            token,
            counts: 0,
            last_evaluated: None,
            next_evaluation_time: Utc::now(),
        });
    }

    /// Stop evaluating a template. In-heap items observe the cancelled
    /// token on pop and drop themselves.
    pub fn delete_usage_template_evaluation(&self, ut: &UsageTemplate) {
        let key = namespaced_key(ut);
        match self.loop_contexts.remove(&key) {
            Some((_, token)) => {
                token.cancel();
                info!(template = %key, reason = events::EVALUATION_STOPPED, "stopped evaluation loop");
                metrics::template_evaluation_stopped(ut);
            }
            None => {
                debug!(template = %key, "loop context was not found in evaluator cache");
            }
        }
    }

    fn add_to_queue(&self, queued: QueuedEvaluation) {
        if queued.token.is_cancelled() {
            debug!(template = %namespaced_key(&queued.template), "context done, not adding to evaluation queue");
            return;
        }
        self.heap.lock().unwrap().push(queued);
    }

    /// Run the single evaluation worker until shutdown
    pub async fn run(self: Arc<Self>) {
        info!("starting evaluation queue");
        let mut tick = tokio::time::interval(EVALUATION_TICK);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("evaluation queue shutting down");
                    return;
                }
                _ = tick.tick() => {
                    self.evaluate_one().await;
                }
            }
        }
    }

    async fn evaluate_one(&self) {
        let popped = { self.heap.lock().unwrap().pop() };
        let Some(mut queued) = popped else {
            return;
        };

        let key = namespaced_key(&queued.template);

        if queued.token.is_cancelled() {
            debug!(template = %key, "context done, not evaluating");
            return;
        }

        if queued.next_evaluation_time <= Utc::now() {
            debug!(template = %key, counts = queued.counts, "attempting to evaluate usage template");

            self.evaluate_resources(&queued).await;
            queued.counts += 1;

            let interval_hours = queued
                .template
                .spec
                .evaluate_period_hours
                .unwrap_or(DEFAULT_EVALUATION_PERIOD_HOURS);
            let now = Utc::now();
            queued.next_evaluation_time = now + ChronoDuration::hours(interval_hours as i64);
            queued.last_evaluated = Some(now);
        } else {
            debug!(template = %key, next = %queued.next_evaluation_time, "too early to evaluate");
        }

        self.add_to_queue(queued);
    }

    async fn evaluate_resources(&self, queued: &QueuedEvaluation) {
        for resource in queued.template.spec.resources.clone() {
            self.evaluate_resource(&queued.token, &queued.template, &resource)
                .await;
        }
    }

    /// Evaluate one resource of one template: build the query, fetch the
    /// range, fold the histogram and patch the status. Each failing step
    /// records a distinct Ready=False reason and leaves the template queued
    /// for the next tick.
    async fn evaluate_resource(&self, token: &CancellationToken, ut: &UsageTemplate, resource: &str) {
        let query = match build_usage_query(
            &ut.spec.filters,
            resource,
            &ut.spec.join_filters,
            &ut.spec.join_labels,
        ) {
            Ok(query) => query,
            Err(err) => {
                error!(%err, resource, "unable to build query");
                self.set_failed_condition(ut, "Unable to build Prometheus query", "BuildUsageQueryError")
                    .await;
                return;
            }
        };

        let end = Utc::now();
        let days = ut
            .spec
            .evaluation_window_days
            .unwrap_or(DEFAULT_EVALUATION_WINDOW_DAYS) as i64;
        let start = end - ChronoDuration::days(days);

        let fetched = tokio::select! {
            _ = token.cancelled() => {
                debug!(template = %namespaced_key(ut), "cancelled during backend fetch");
                return;
            }
            result = self.prom_client.query_range(
                &query,
                start,
                end,
                self.evaluation_resolution,
                self.global_http_timeout,
            ) => result,
        };

        let matrix = match fetched {
            Ok(matrix) => matrix,
            Err(err) => {
                error!(%err, %query, "failed querying prometheus");
                self.set_failed_condition(ut, "Unable to fetch from Prometheus", "FetchQueryError")
                    .await;
                return;
            }
        };

        // a cancellation racing the fetch skips the status patch
        if token.is_cancelled() {
            return;
        }

        let estimator = match build_histogram(&matrix) {
            Ok(estimator) => estimator,
            Err(err) => {
                error!(%err, resource, %query, "failed to build datetime decaying histogram");
                self.set_failed_condition(ut, "Unable to build histogram", "BuildHistogramError")
                    .await;
                return;
            }
        };

        if let Err(err) = self.estimate_hour_usage(ut, &estimator, resource).await {
            error!(%err, resource, "failed to estimate hourly usage");
            self.set_failed_condition(ut, "Unable to estimate hourly usage", "EstimateHourlyUsageError")
                .await;
            return;
        }

        debug!(template = %namespaced_key(ut), %query, "successfully evaluated usage template");
    }

    async fn set_failed_condition(&self, ut: &UsageTemplate, message: &str, reason: &str) {
        if let Err(err) =
            update_ready_condition(&self.client, ut, ConditionStatus::False, reason, message).await
        {
            error!(%err, template = %namespaced_key(ut), "unable to update ready condition");
        }
    }

    /// Extract the per-hour percentile, scale to the canonical unit and
    /// patch the template status
    async fn estimate_hour_usage(
        &self,
        ut: &UsageTemplate,
        estimator: &DateTimeEstimator,
        resource: &str,
    ) -> Result<(), HoraeError> {
        // default to the 95th percentile to be conservative
        let percentile = if ut.spec.quality_of_service_class == "Guaranteed" {
            0.95
        } else {
            0.5
        };

        let unit = metric_unit(resource)
            .ok_or_else(|| HoraeError::UnsupportedResource(resource.to_string()))?;
        let scale = scaling_factor(resource)
            .ok_or_else(|| HoraeError::UnsupportedResource(resource.to_string()))?;

        let mut samples = Vec::new();
        for hour_estimator in &estimator.histograms {
            if hour_estimator.histogram.is_empty() {
                continue;
            }
            let scaled = hour_estimator.histogram.percentile(percentile) * scale;
            samples.push(Sample {
                hour: (hour_estimator.hour % 24) as i32,
                value: scaled.to_string(),
                percentile: percentile.to_string(),
                unit: unit.to_string(),
                is_weekday: hour_estimator.is_weekday,
            });
        }

        let historical_usage = ResourceUsages {
            items: vec![ResourceUsage {
                resource: resource.to_string(),
                usages: samples,
            }],
        };

        let namespace = ut.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<UsageTemplate> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({
            "status": {
                "historicalUsage": historical_usage,
                "isLongRunning": estimator.is_long_running(),
            }
        });
        api.patch_status(&ut.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| HoraeError::KubernetesError(err.to_string()))?;

        Ok(())
    }
}

/// Fold a response matrix into the 48-slot estimator, branching on whether
/// the workload ran longer than a day
pub fn build_histogram(matrix: &Matrix) -> Result<DateTimeEstimator, HoraeError> {
    let mut estimator = DateTimeEstimator::new();

    let now = Utc::now();
    let (max_week, is_long_running) = find_max_week_and_check_long_running(matrix, now)?;

    if is_long_running {
        add_weighted_samples_by_week(&mut estimator, max_week, matrix, now)?;
    } else {
        // short-lived workloads collapse toward hour zero; the scheduler
        // superimposes them onto the candidate placement time
        add_shifted_weighted_samples_by_week(&mut estimator, max_week, matrix, now)?;
    }

    Ok(estimator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::promclient::{MetricSample, Series};
    use std::collections::BTreeMap;

    fn series(container: &str, samples: &[(DateTime<Utc>, f64)]) -> Series {
        Series {
            metric: BTreeMap::from([("container".to_string(), container.to_string())]),
            values: samples
                .iter()
                .map(|(timestamp, value)| MetricSample {
                    timestamp: *timestamp,
                    value: *value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_queued_evaluation_orders_by_next_time() {
        let token = CancellationToken::new();
        let mut heap = BinaryHeap::new();
        let now = Utc::now();

        for offset in [30i64, 10, 20] {
            heap.push(QueuedEvaluation {
                template: UsageTemplate::new(&format!("t-{}", offset), Default::default()),
                token: token.child_token(),
                counts: 0,
                last_evaluated: None,
                next_evaluation_time: now + ChronoDuration::minutes(offset),
            });
        }

        let first = heap.pop().unwrap();
        assert_eq!(first.next_evaluation_time, now + ChronoDuration::minutes(10));
        let second = heap.pop().unwrap();
        assert_eq!(second.next_evaluation_time, now + ChronoDuration::minutes(20));
    }

    #[test]
    fn test_build_histogram_long_running_path() {
        let now = Utc::now();
        let matrix = vec![series(
            "web",
            &[
                (now - ChronoDuration::hours(30), 0.5),
                (now - ChronoDuration::hours(1), 0.5),
            ],
        )];
        let estimator = build_histogram(&matrix).unwrap();
        let populated = estimator
            .histograms
            .iter()
            .filter(|h| !h.histogram.is_empty())
            .count();
        assert!(populated >= 1);
    }

    #[test]
    fn test_build_histogram_short_running_collapses_to_hour_zero() {
        let now = Utc::now();
        let matrix = vec![series("web", &[(now - ChronoDuration::minutes(30), 0.5)])];
        let estimator = build_histogram(&matrix).unwrap();

        let populated: Vec<usize> = estimator
            .histograms
            .iter()
            .filter(|h| !h.histogram.is_empty())
            .map(|h| h.hour)
            .collect();
        assert_eq!(populated.len(), 1);
        assert!(populated[0] == 0 || populated[0] == 24);
    }

    #[test]
    fn test_build_histogram_rejects_empty_matrix() {
        assert!(build_histogram(&vec![]).is_err());
    }
}

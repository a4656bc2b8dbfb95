//! Hotspot-penalised node scoring
//!
//! Per hour, utilisation below the hotspot threshold is rewarded linearly
//! up to a peak of 100 at the threshold; utilisation at or past the
//! threshold is either penalised towards 0 (soft) or scored out entirely
//! (hard). The node score is the rounded sum over all 48 hours, averaged
//! across resources.

use crate::framework::{NodeInfo, Status, MAX_NODE_SCORE, MIN_NODE_SCORE};
use crate::types::Forecast;
use horae_api::resources::CPU_RESOURCE;
use std::collections::HashMap;
use tracing::warn;

fn calculate_hour_score(usage_percent: f64, threshold_percent: f64, hard: bool) -> f64 {
    if usage_percent >= threshold_percent {
        if hard {
            return MIN_NODE_SCORE as f64;
        }
        // with the threshold at the score ceiling the penalty band is empty
        if threshold_percent >= MAX_NODE_SCORE as f64 {
            return MIN_NODE_SCORE as f64;
        }
        return threshold_percent * (MAX_NODE_SCORE as f64 - usage_percent)
            / (MAX_NODE_SCORE as f64 - threshold_percent);
    }
    usage_percent / threshold_percent * (MAX_NODE_SCORE as f64 - threshold_percent)
        + threshold_percent
}

fn score_over_hours(
    hours: &HashMap<i16, f32>,
    node_capacity_milli: i64,
    threshold_percent: i64,
    hard: bool,
) -> i64 {
    let mut total = 0.0;
    for milli_value in hours.values() {
        let usage_percent = *milli_value as f64 / node_capacity_milli as f64 * 100.0;
        total += calculate_hour_score(usage_percent, threshold_percent as f64, hard).round();
    }
    total.round() as i64
}

fn forecast_score(
    node_capacity_milli: i64,
    forecast: &Forecast,
    threshold_percent: i64,
    hard: bool,
) -> i64 {
    let weekday = score_over_hours(&forecast.week_day_hour, node_capacity_milli, threshold_percent, hard);
    let weekend = score_over_hours(&forecast.weekend_hour, node_capacity_milli, threshold_percent, hard);
    weekday + weekend
}

/// Score a node from the composed forecasts of its pods plus the incoming
/// pod. Resources without scoring support are skipped; no supported
/// resource at all is an error.
pub fn score_node(
    node_info: &NodeInfo,
    forecasts: &HashMap<String, Forecast>,
    hotspot_threshold: i32,
    hard: bool,
) -> Result<i64, Status> {
    let node_cpu_milli = node_info.capacity_milli_cpu();
    let mut total_score: i64 = 0;
    let mut resource_count: i64 = 0;

    for (resource, forecast) in forecasts {
        if resource == CPU_RESOURCE {
            total_score += forecast_score(node_cpu_milli, forecast, hotspot_threshold as i64, hard);
            resource_count += 1;
        } else {
            warn!(%resource, "unsupported resource type for scoring");
        }
    }

    if resource_count == 0 {
        return Err(Status::error("No supported resources found"));
    }

    Ok(((total_score as f64) / (resource_count as f64)).round() as i64)
}

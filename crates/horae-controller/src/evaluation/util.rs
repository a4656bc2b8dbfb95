//! Sample folding helpers for the evaluator
//!
//! Turns a response matrix into weighted estimator samples. Long-running
//! workloads keep their wall-clock hours; short-running workloads are
//! collapsed towards hour zero so the scheduler can superimpose them onto
//! the candidate placement time.

use super::estimator::DateTimeEstimator;
use super::promclient::Matrix;
use chrono::{DateTime, Datelike, Timelike, Utc};
use horae_common::HoraeError;
use std::collections::HashSet;
use tracing::trace;

/// Metric label naming the container a series belongs to
pub const CONTAINER_METRIC_LABEL: &str = "container";

const HOURS_PER_WEEK: f64 = 24.0 * 7.0;

/// Week difference from start to end, rounded to the nearest whole week
pub fn week_difference_utc(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    (hours / HOURS_PER_WEEK).round() as i64
}

/// Scan the matrix for the oldest sample week and the longest per-series
/// duration. The matrix must cover exactly one distinct container.
/// Long-running means some series spans more than 24 hours.
pub fn find_max_week_and_check_long_running(
    matrix: &Matrix,
    now: DateTime<Utc>,
) -> Result<(i64, bool), HoraeError> {
    let mut containers: HashSet<String> = HashSet::new();
    let mut max_week: i64 = 0;
    let mut max_duration = chrono::Duration::zero();

    for series in matrix {
        let Some(container) = series.metric.get(CONTAINER_METRIC_LABEL) else {
            continue;
        };

        let mut start_time = now;
        let mut end_time: Option<DateTime<Utc>> = None;
        for sample in &series.values {
            max_week = max_week.max(week_difference_utc(sample.timestamp, now));
            if sample.timestamp < start_time {
                start_time = sample.timestamp;
            }
            if end_time.map(|e| sample.timestamp > e).unwrap_or(true) {
                end_time = Some(sample.timestamp);
            }
        }
        if let Some(end_time) = end_time {
            let duration = end_time - start_time;
            if duration > max_duration {
                max_duration = duration;
            }
            trace!(%container, ?duration, "container series duration");
            containers.insert(container.clone());
        }
    }

    if containers.len() > 1 {
        let mut names: Vec<_> = containers.into_iter().collect();
        names.sort();
        return Err(HoraeError::HistogramError(format!(
            "expected one container only, got: {:?}",
            names
        )));
    }
    if containers.is_empty() {
        return Err(HoraeError::HistogramError(
            "expected at least one container, got zero".to_string(),
        ));
    }

    let is_long_running = max_duration > chrono::Duration::hours(24);
    Ok((max_week, is_long_running))
}

/// Add one sample, weighting recent weeks heavier and routing weekends to
/// the second slot block. The weight follows the load-signal idea of
/// unitTime x value, where the unit is how many weeks back the sample is:
/// with maxWeek 3, a sample from this week weighs 4x its value, one from
/// three weeks ago only 1x.
fn add_sample_by_weighted_week_utc(
    estimator: &mut DateTimeEstimator,
    max_week: i64,
    weeks_ago: i64,
    t: DateTime<Utc>,
    given_hour: i64,
    value: f64,
) -> Result<(), HoraeError> {
    let weight = if max_week > 0 {
        max_week - weeks_ago + 1
    } else {
        1
    };

    let is_weekday = (1..=5).contains(&t.weekday().number_from_monday());
    let slot = if is_weekday {
        given_hour
    } else {
        given_hour + 24
    };

    estimator.add_sample(slot as usize, value, weight as f64 * value, t)
}

/// Fold a long-running workload: every sample lands at its UTC hour
pub fn add_weighted_samples_by_week(
    estimator: &mut DateTimeEstimator,
    max_week: i64,
    matrix: &Matrix,
    now: DateTime<Utc>,
) -> Result<(), HoraeError> {
    for series in matrix {
        for sample in &series.values {
            let weeks_ago = week_difference_utc(sample.timestamp, now);
            add_sample_by_weighted_week_utc(
                estimator,
                max_week,
                weeks_ago,
                sample.timestamp,
                sample.timestamp.hour() as i64,
                sample.value,
            )?;
        }
    }
    Ok(())
}

/// Fold a short-running workload: each series is shifted so its first
/// sample lands at hour zero. The raw offset hour is kept, so a series
/// spanning more than a day surfaces as an out-of-range slot error.
pub fn add_shifted_weighted_samples_by_week(
    estimator: &mut DateTimeEstimator,
    max_week: i64,
    matrix: &Matrix,
    now: DateTime<Utc>,
) -> Result<(), HoraeError> {
    for series in matrix {
        let mut series_min_time = now;
        for sample in &series.values {
            if sample.timestamp < series_min_time {
                series_min_time = sample.timestamp;
            }
        }

        for sample in &series.values {
            let weeks_ago = week_difference_utc(sample.timestamp, now);
            let offset = sample.timestamp - series_min_time;
            let given_hour = (offset.num_seconds() as f64 / 3600.0).round() as i64;
            if given_hour < 0 {
                return Err(HoraeError::HistogramError(format!(
                    "unexpected hour difference, sample time: {}, min time: {}",
                    sample.timestamp, series_min_time
                )));
            }
            add_sample_by_weighted_week_utc(
                estimator,
                max_week,
                weeks_ago,
                sample.timestamp,
                given_hour,
                sample.value,
            )?;
        }
    }
    Ok(())
}

//! Prometheus range-query client
//!
//! Issues bounded `query_range` calls and returns the response as a typed
//! matrix. Anything other than a matrix result is a typed error; warnings
//! are logged but not fatal.

use chrono::{DateTime, TimeZone, Utc};
use horae_common::HoraeError;
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Default in-cluster Prometheus address
pub const DEFAULT_PROM_ADDRESS: &str = "http://prometheus-kube-prometheus-stack-prometheus:9090";

/// One labelled time series of the response matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<MetricSample>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

pub type Matrix = Vec<Series>;

#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    #[serde(default)]
    data: Option<PrometheusData>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

fn parse_matrix(result_type: &str, result: serde_json::Value) -> Result<Matrix, HoraeError> {
    if result_type != "matrix" {
        return Err(HoraeError::UnexpectedResultType(format!(
            "expected matrix, got {}",
            result_type
        )));
    }

    let raw: Vec<RangeSeries> = serde_json::from_value(result)?;
    let mut matrix = Vec::with_capacity(raw.len());
    for series in raw {
        let mut values = Vec::with_capacity(series.values.len());
        for (ts, value) in series.values {
            let secs = ts.trunc() as i64;
            let nanos = ((ts - ts.trunc()) * 1e9) as u32;
            let timestamp = Utc
                .timestamp_opt(secs, nanos)
                .single()
                .ok_or_else(|| HoraeError::QueryFailed(format!("invalid timestamp {}", ts)))?;
            let value = value
                .parse::<f64>()
                .map_err(|err| HoraeError::QueryFailed(format!("invalid value: {}", err)))?;
            values.push(MetricSample { timestamp, value });
        }
        matrix.push(Series {
            metric: series.metric,
            values,
        });
    }
    Ok(matrix)
}

pub struct PromClient {
    base_url: Url,
    http: reqwest::Client,
}

impl PromClient {
    pub fn new(address: &str) -> Result<Self, HoraeError> {
        let target = if address.is_empty() {
            DEFAULT_PROM_ADDRESS
        } else {
            address
        };
        let base_url = Url::parse(target)
            .map_err(|err| HoraeError::ConfigError(format!("invalid Prometheus address: {}", err)))?;
        let http = reqwest::Client::new();
        Ok(Self { base_url, http })
    }

    /// Run a range query over [start, end] at the given step. The call is
    /// bounded by `timeout`.
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        timeout: Duration,
    ) -> Result<Matrix, HoraeError> {
        let url = self
            .base_url
            .join("/api/v1/query_range")
            .map_err(|err| HoraeError::ConfigError(err.to_string()))?;

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .query(&[
                ("query", query.to_string()),
                ("start", start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("step", step.as_secs().to_string()),
            ])
            .send()
            .await
            .map_err(|err| HoraeError::QueryFailed(err.to_string()))?;

        let body: PrometheusResponse = response
            .json()
            .await
            .map_err(|err| HoraeError::QueryFailed(err.to_string()))?;

        if !body.warnings.is_empty() {
            warn!(warnings = ?body.warnings, "warnings from Prometheus");
        }

        if body.status != "success" {
            return Err(HoraeError::QueryFailed(
                body.error.unwrap_or_else(|| body.status.clone()),
            ));
        }

        let data = body
            .data
            .ok_or_else(|| HoraeError::QueryFailed("response carries no data".to_string()))?;

        parse_matrix(&data.result_type, data.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_matrix() {
        let result = json!([
            {
                "metric": {"container": "web", "pod": "web-0"},
                "values": [[1700000000.0, "0.25"], [1700000300.0, "0.5"]]
            }
        ]);
        let matrix = parse_matrix("matrix", result).unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].metric["container"], "web");
        assert_eq!(matrix[0].values.len(), 2);
        assert_eq!(matrix[0].values[1].value, 0.5);
        assert_eq!(matrix[0].values[0].timestamp.timestamp(), 1700000000);
    }

    #[test]
    fn test_non_matrix_is_rejected() {
        let err = parse_matrix("vector", json!([])).unwrap_err();
        assert_eq!(err.code(), "UNEXPECTED_RESULT_TYPE");
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let result = json!([
            {"metric": {}, "values": [[1700000000.0, "NaN-ish"]]}
        ]);
        assert!(parse_matrix("matrix", result).is_err());
    }

    #[test]
    fn test_client_rejects_malformed_address() {
        assert!(PromClient::new("not a url").is_err());
        assert!(PromClient::new("").is_ok());
        assert!(PromClient::new("http://prometheus:9090").is_ok());
    }
}

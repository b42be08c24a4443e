use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of the anomaly detector's `/anomalies` endpoint.
///
/// The detector reports `{ "error": ... }` instead of a window when its own
/// upstream query failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFeed {
    #[serde(default)]
    pub anomalies: Vec<AnomalyRecord>,
    #[serde(default)]
    pub samples: Option<u64>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub ts: String,
    pub value: f64,
    /// Absent for detections that are not z-score based.
    #[serde(default)]
    pub z: Option<f64>,
    pub method: String,
    #[serde(default)]
    pub metric: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub t: DateTime<Utc>,
    pub value: f64,
    pub zscore: Option<f64>,
    pub method: String,
    pub metric: String,
}

impl AnomalyRecord {
    pub fn to_point(&self, default_metric: &str) -> Result<AnomalyPoint, chrono::ParseError> {
        Ok(AnomalyPoint {
            t: parse_timestamp(&self.ts)?,
            value: self.value,
            zscore: self.z,
            method: self.method.clone(),
            metric: self
                .metric
                .clone()
                .unwrap_or_else(|| default_metric.to_string()),
        })
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601, the latter read as UTC.
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(_) => ts.parse::<NaiveDateTime>().map(|t| t.and_utc()),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-class response counters, cumulative since the backend started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(rename = "2xx", default)]
    pub status_2xx: u64,
    #[serde(rename = "3xx", default)]
    pub status_3xx: u64,
    #[serde(rename = "4xx", default)]
    pub status_4xx: u64,
    #[serde(rename = "5xx", default)]
    pub status_5xx: u64,
}

/// One reading of the management API's metrics endpoint.
///
/// `fetched_at` is not read from the payload; the poller stamps it with the
/// local completion time so every series shares one clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    #[serde(skip_deserializing)]
    pub fetched_at: DateTime<Utc>,
    pub active_connections: f64,
    #[serde(default)]
    pub reading: f64,
    #[serde(default)]
    pub writing: f64,
    #[serde(default)]
    pub waiting: f64,
    pub cumulative_requests: u64,
    #[serde(default)]
    pub status_counts: StatusCounts,
    #[serde(default)]
    pub latency_ms: f64,
    #[serde(default)]
    pub bandwidth_mbps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub v: f64,
}

/// Where a series gets its value from in a [`MetricSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    ActiveConnections,
    Reading,
    Writing,
    Waiting,
    RequestsPerInterval,
    Status2xx,
    Status3xx,
    Status4xx,
    Status5xx,
    LatencyMs,
    BandwidthMbps,
}

/// Reading taken from a snapshot for one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Gauge(f64),
    Counter(u64),
}

impl MetricField {
    pub const ALL: [MetricField; 11] = [
        MetricField::ActiveConnections,
        MetricField::Reading,
        MetricField::Writing,
        MetricField::Waiting,
        MetricField::RequestsPerInterval,
        MetricField::Status2xx,
        MetricField::Status3xx,
        MetricField::Status4xx,
        MetricField::Status5xx,
        MetricField::LatencyMs,
        MetricField::BandwidthMbps,
    ];

    pub fn series_name(&self) -> &'static str {
        match self {
            Self::ActiveConnections => "active_connections",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Waiting => "waiting",
            Self::RequestsPerInterval => "requests_per_interval",
            Self::Status2xx => "status_2xx",
            Self::Status3xx => "status_3xx",
            Self::Status4xx => "status_4xx",
            Self::Status5xx => "status_5xx",
            Self::LatencyMs => "latency_ms",
            Self::BandwidthMbps => "bandwidth_mbps",
        }
    }

    pub fn read(&self, snapshot: &MetricSnapshot) -> FieldValue {
        let counts = &snapshot.status_counts;
        match self {
            Self::ActiveConnections => FieldValue::Gauge(snapshot.active_connections),
            Self::Reading => FieldValue::Gauge(snapshot.reading),
            Self::Writing => FieldValue::Gauge(snapshot.writing),
            Self::Waiting => FieldValue::Gauge(snapshot.waiting),
            Self::RequestsPerInterval => FieldValue::Counter(snapshot.cumulative_requests),
            Self::Status2xx => FieldValue::Counter(counts.status_2xx),
            Self::Status3xx => FieldValue::Counter(counts.status_3xx),
            Self::Status4xx => FieldValue::Counter(counts.status_4xx),
            Self::Status5xx => FieldValue::Counter(counts.status_5xx),
            Self::LatencyMs => FieldValue::Gauge(snapshot.latency_ms),
            Self::BandwidthMbps => FieldValue::Gauge(snapshot.bandwidth_mbps),
        }
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.series_name())
    }
}

impl std::str::FromStr for MetricField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.series_name() == s)
            .ok_or_else(|| format!("unknown series: {s:?}"))
    }
}

use std::{num::NonZeroUsize, time::Duration};

use serde::Serialize;
use url::Url;

use crate::{
    anomaly::AnomalySnapshot,
    logs::{backoff::BackoffPolicy, ConnectionState, LogCategory},
    metrics::{MetricField, SeriesSnapshot},
    poll::FeedStatus,
};

/// Everything an [`super::ObservabilityView`] needs besides its data sources.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub stream_base_url: Url,
    pub categories: Vec<LogCategory>,
    pub log_capacity: NonZeroUsize,
    pub backoff: BackoffPolicy,
    pub series_capacity: NonZeroUsize,
    pub tracked_series: Vec<MetricField>,
    pub metrics_interval: Duration,
    pub anomaly_capacity: NonZeroUsize,
    pub anomaly_interval: Duration,
    pub default_anomaly_metric: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub category: LogCategory,
    pub url: String,
    pub state: ConnectionState,
    pub buffered: usize,
    pub pushed: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewStatus {
    pub metrics: FeedStatus,
    /// `None` when the anomaly feed is disabled.
    pub anomalies: Option<FeedStatus>,
    pub streams: Vec<StreamStatus>,
}

/// Full copy of what the dashboard renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub status: ViewStatus,
    pub series: SeriesSnapshot,
    pub anomalies: AnomalySnapshot,
}

pub mod client;

use async_trait::async_trait;

use crate::{anomaly::types::AnomalyFeed, metrics::types::MetricSnapshot, poll::FetchError};

pub use client::{ApiClient, ApiClientConfig};

/// Something that can produce the current metric counters.
#[async_trait]
pub trait MetricsSource: Send + Sync + 'static {
    async fn fetch_metrics(&self) -> Result<MetricSnapshot, FetchError>;
}

/// Something that can produce the current anomaly window.
#[async_trait]
pub trait AnomalySource: Send + Sync + 'static {
    async fn fetch_anomalies(&self) -> Result<AnomalyFeed, FetchError>;
}

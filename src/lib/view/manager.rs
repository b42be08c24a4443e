use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use tokio::sync::{watch, RwLock};
use tracing::*;

use crate::{
    anomaly::{AnomalyFeedJoiner, AnomalySeries, AnomalySnapshot, SharedAnomalySeries},
    api::{AnomalySource, MetricsSource},
    buffer::Order,
    logs::{
        connection::SharedLogBuffer,
        transport::{category_url, LogTransport},
        ConnectionState, LogCategory, LogLine, StreamConnection,
    },
    metrics::{MetricsPoller, SeriesPoint, SeriesSnapshot, SeriesStore, SharedSeriesStore},
    poll::FeedStatus,
};

use super::types::{DashboardSnapshot, StreamStatus, ViewConfig, ViewStatus};

/// Data sources of a view. `anomalies` is `None` when the anomaly feed is
/// disabled.
#[derive(Clone)]
pub struct Sources {
    pub metrics: Arc<dyn MetricsSource>,
    pub anomalies: Option<Arc<dyn AnomalySource>>,
    pub transport: Arc<dyn LogTransport>,
}

/// Owns every live component of one viewing session.
pub struct ObservabilityView {
    config: ViewConfig,
    transport: Arc<dyn LogTransport>,
    streams: Vec<StreamConnection>,
    poller: MetricsPoller,
    joiner: Option<AnomalyFeedJoiner>,
    reader: ViewReader,
}

impl std::fmt::Debug for ObservabilityView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityView")
            .field("config", &self.config)
            .field("streams", &self.streams)
            .field("poller", &self.poller)
            .field("joiner", &self.joiner)
            .finish()
    }
}

/// Read-only, clonable access to a view's buffers.
#[derive(Clone)]
pub struct ViewReader {
    store: SharedSeriesStore,
    anomalies: SharedAnomalySeries,
    streams: Vec<StreamHandle>,
    metrics_status: watch::Receiver<FeedStatus>,
    anomaly_status: Option<watch::Receiver<FeedStatus>>,
}

#[derive(Clone)]
struct StreamHandle {
    category: LogCategory,
    url: String,
    buffer: SharedLogBuffer,
    state: watch::Receiver<ConnectionState>,
}

impl ObservabilityView {
    #[instrument(level = "debug", skip(sources))]
    pub fn new(config: ViewConfig, sources: Sources) -> Result<Self> {
        let mut streams: Vec<StreamConnection> = Vec::with_capacity(config.categories.len());
        for category in &config.categories {
            ensure!(
                streams.iter().all(|stream| stream.category() != *category),
                "{category} logs are listed more than once"
            );
            let url = category_url(&config.stream_base_url, category.as_str())
                .with_context(|| format!("Invalid stream URL for {category} logs"))?;
            streams.push(StreamConnection::new(
                *category,
                url,
                config.log_capacity,
                config.backoff,
            ));
        }

        let store: SharedSeriesStore =
            Arc::new(RwLock::new(SeriesStore::new(config.series_capacity)));
        let poller = MetricsPoller::new(sources.metrics, store.clone(), &config.tracked_series);

        let anomalies: SharedAnomalySeries =
            Arc::new(RwLock::new(AnomalySeries::new(config.anomaly_capacity)));
        let joiner = sources.anomalies.map(|source| {
            AnomalyFeedJoiner::new(source, anomalies.clone(), &config.default_anomaly_metric)
        });

        let reader = ViewReader {
            store,
            anomalies,
            streams: streams
                .iter()
                .map(|stream| StreamHandle {
                    category: stream.category(),
                    url: stream.url().to_string(),
                    buffer: stream.buffer(),
                    state: stream.state_receiver(),
                })
                .collect(),
            metrics_status: poller.status_receiver(),
            anomaly_status: joiner.as_ref().map(AnomalyFeedJoiner::status_receiver),
        };

        Ok(Self {
            config,
            transport: sources.transport,
            streams,
            poller,
            joiner,
            reader,
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn reader(&self) -> ViewReader {
        self.reader.clone()
    }

    /// Opens every log stream and starts both pollers.
    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self) {
        for stream in &mut self.streams {
            stream.open(self.transport.clone());
        }

        self.poller.start(self.config.metrics_interval);

        match &mut self.joiner {
            Some(joiner) => joiner.start(self.config.anomaly_interval),
            None => info!("Anomaly feed disabled"),
        }
    }

    /// Stops every component. Once this returns, no buffer or series is
    /// mutated again.
    #[instrument(level = "debug", skip(self))]
    pub async fn shutdown(&mut self) {
        self.poller.stop().await;

        if let Some(joiner) = &mut self.joiner {
            joiner.stop().await;
        }

        for stream in &mut self.streams {
            stream.close().await;
        }

        info!("Observability view shut down");
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.reader.snapshot().await
    }
}

impl ViewReader {
    pub async fn status(&self) -> ViewStatus {
        let mut streams = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            let buffer = stream.buffer.read().await;
            streams.push(StreamStatus {
                category: stream.category,
                url: stream.url.clone(),
                state: *stream.state.borrow(),
                buffered: buffer.len(),
                pushed: buffer.pushed(),
                evicted: buffer.evicted(),
            });
        }

        ViewStatus {
            metrics: self.metrics_status.borrow().clone(),
            anomalies: self
                .anomaly_status
                .as_ref()
                .map(|status| status.borrow().clone()),
            streams,
        }
    }

    pub async fn series(&self) -> SeriesSnapshot {
        self.store.read().await.snapshot_all()
    }

    pub async fn series_by_name(&self, name: &str) -> Option<Vec<SeriesPoint>> {
        self.store.read().await.snapshot(name)
    }

    pub async fn anomalies(&self) -> AnomalySnapshot {
        self.anomalies.read().await.snapshot()
    }

    /// `None` when the category is not tailed by this view.
    pub async fn logs(&self, category: LogCategory, order: Order) -> Option<Vec<LogLine>> {
        let stream = self
            .streams
            .iter()
            .find(|stream| stream.category == category)?;
        Some(stream.buffer.read().await.snapshot(order))
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            status: self.status().await,
            series: self.series().await,
            anomalies: self.anomalies().await,
        }
    }
}

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::sync::{watch, RwLock};
use tracing::*;

use crate::{
    api::AnomalySource,
    helper::lifetime::Lifetime,
    poll::{self, FeedStatus},
};

use super::{series::AnomalySeries, types::AnomalyFeed};

pub type SharedAnomalySeries = Arc<RwLock<AnomalySeries>>;

/// Polls the anomaly feed on its own cadence, independent of the metrics
/// poller, and appends new detections to an [`AnomalySeries`].
pub struct AnomalyFeedJoiner {
    source: Arc<dyn AnomalySource>,
    series: SharedAnomalySeries,
    default_metric: Arc<str>,
    status: Arc<watch::Sender<FeedStatus>>,
    lifetime: Lifetime,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for AnomalyFeedJoiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyFeedJoiner")
            .field("default_metric", &self.default_metric)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for AnomalyFeedJoiner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl AnomalyFeedJoiner {
    pub fn new(
        source: Arc<dyn AnomalySource>,
        series: SharedAnomalySeries,
        default_metric: &str,
    ) -> Self {
        let (status, _) = watch::channel(FeedStatus::default());

        Self {
            source,
            series,
            default_metric: default_metric.into(),
            status: Arc::new(status),
            lifetime: Lifetime::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn series(&self) -> SharedAnomalySeries {
        self.series.clone()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self, interval: Duration) {
        if self.is_running() {
            warn!("Anomaly feed joiner is already running");
            return;
        }

        let source = self.source.clone();
        let fetch = move || {
            let source = source.clone();
            async move { source.fetch_anomalies().await }.boxed()
        };

        let series = self.series.clone();
        let default_metric = self.default_metric.clone();
        let apply = move |feed: AnomalyFeed, _fetched_at: chrono::DateTime<chrono::Utc>| {
            let series = series.clone();
            let default_metric = default_metric.clone();
            async move {
                series.write().await.ingest(&feed, &default_metric);
            }
        };

        let lifetime = self.lifetime.clone();
        let status = self.status.clone();
        let span = span!(Level::DEBUG, "anomaly_joiner");
        self.task = Some(tokio::spawn(
            async move { poll::run("anomalies", interval, &lifetime, &status, fetch, apply).await }
                .instrument(span),
        ));

        info!("Polling anomaly feed every {interval:?}");
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&mut self) {
        self.lifetime.end().await;

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        self.lifetime = Lifetime::new();
        debug!("Anomaly feed joiner stopped");
    }
}

use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::sync::{watch, RwLock};
use tracing::*;

use crate::{
    api::MetricsSource,
    helper::lifetime::Lifetime,
    poll::{self, FeedStatus},
};

use super::{
    store::SeriesStore,
    types::{MetricField, MetricSnapshot},
};

pub type SharedSeriesStore = Arc<RwLock<SeriesStore>>;

/// Periodically fetches the metric counters and feeds them into a
/// [`SeriesStore`].
pub struct MetricsPoller {
    source: Arc<dyn MetricsSource>,
    store: SharedSeriesStore,
    tracked: Arc<[MetricField]>,
    status: Arc<watch::Sender<FeedStatus>>,
    lifetime: Lifetime,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for MetricsPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsPoller")
            .field("tracked", &self.tracked)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl MetricsPoller {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        store: SharedSeriesStore,
        tracked: &[MetricField],
    ) -> Self {
        let (status, _) = watch::channel(FeedStatus::default());

        Self {
            source,
            store,
            tracked: tracked.into(),
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

    pub fn store(&self) -> SharedSeriesStore {
        self.store.clone()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self, interval: Duration) {
        if self.is_running() {
            warn!("Metrics poller is already running");
            return;
        }

        let source = self.source.clone();
        let fetch = move || {
            let source = source.clone();
            async move { source.fetch_metrics().await }.boxed()
        };

        let store = self.store.clone();
        let tracked = self.tracked.clone();
        let apply = move |mut snapshot: MetricSnapshot, fetched_at| {
            let store = store.clone();
            let tracked = tracked.clone();
            async move {
                snapshot.fetched_at = fetched_at;
                store.write().await.apply_snapshot(&snapshot, &tracked);
            }
        };

        let lifetime = self.lifetime.clone();
        let status = self.status.clone();
        let span = span!(Level::DEBUG, "metrics_poller");
        self.task = Some(tokio::spawn(
            async move { poll::run("metrics", interval, &lifetime, &status, fetch, apply).await }
                .instrument(span),
        ));

        info!("Polling metrics every {interval:?}");
    }

    /// Stops polling. Once this returns, no fetch result reaches the store,
    /// including one that was in flight. The poller can be started again.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&mut self) {
        self.lifetime.end().await;

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        self.lifetime = Lifetime::new();
        debug!("Metrics poller stopped");
    }
}

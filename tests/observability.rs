use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use tokio::sync::Notify;
use url::Url;

use lb_observatory::{
    anomaly::AnomalyFeed,
    api::{AnomalySource, MetricsSource},
    buffer::Order,
    logs::{
        backoff::BackoffPolicy,
        transport::{LineStream, LogTransport, TransportError},
        ConnectionState, LogCategory,
    },
    metrics::{MetricField, MetricSnapshot},
    poll::{FeedState, FetchError},
    view::{ObservabilityView, Sources, ViewConfig},
};

/// Answers the first request at once and holds every later one until released.
struct HeldSource {
    calls: AtomicUsize,
    release: Notify,
}

impl HeldSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        })
    }

    async fn answer(&self) -> usize {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call > 0 {
            self.release.notified().await;
        }
        call
    }
}

#[async_trait]
impl MetricsSource for HeldSource {
    async fn fetch_metrics(&self) -> Result<MetricSnapshot, FetchError> {
        let call = self.answer().await as u64;
        Ok(MetricSnapshot {
            active_connections: 1.0,
            cumulative_requests: 100 + call,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AnomalySource for HeldSource {
    async fn fetch_anomalies(&self) -> Result<AnomalyFeed, FetchError> {
        self.answer().await;
        Ok(AnomalyFeed::default())
    }
}

/// Hands each connection the receiving end of a channel the test writes to.
#[derive(Default)]
struct ChannelTransport {
    senders: Mutex<Vec<mpsc::UnboundedSender<Result<String, TransportError>>>>,
}

#[async_trait]
impl LogTransport for ChannelTransport {
    async fn connect(&self, _url: &Url) -> Result<LineStream, TransportError> {
        let (sender, receiver) = mpsc::unbounded();
        self.senders.lock().unwrap().push(sender);
        Ok(receiver.boxed())
    }
}

impl ChannelTransport {
    fn send_to_all(&self, line: &str) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.unbounded_send(Ok(line.to_string()));
        }
    }
}

fn config() -> ViewConfig {
    ViewConfig {
        stream_base_url: Url::parse("ws://localhost:8000/ws/logs").unwrap(),
        categories: LogCategory::ALL.to_vec(),
        log_capacity: NonZeroUsize::new(200).unwrap(),
        backoff: BackoffPolicy::default(),
        series_capacity: NonZeroUsize::new(30).unwrap(),
        tracked_series: MetricField::ALL.to_vec(),
        metrics_interval: Duration::from_secs(10),
        anomaly_capacity: NonZeroUsize::new(30).unwrap(),
        anomaly_interval: Duration::from_secs(30),
        default_anomaly_metric: "requests".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn nothing_changes_after_shutdown() {
    let metrics = HeldSource::new();
    let anomalies = HeldSource::new();
    let transport = Arc::new(ChannelTransport::default());

    let mut view = ObservabilityView::new(
        config(),
        Sources {
            metrics: metrics.clone(),
            anomalies: Some(anomalies.clone()),
            transport: transport.clone(),
        },
    )
    .unwrap();
    view.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    transport.send_to_all("GET / 200");
    tokio::time::sleep(Duration::from_secs(40)).await;

    // A second fetch of each feed is now waiting on its response.
    assert!(metrics.calls.load(Ordering::SeqCst) >= 2);
    assert!(anomalies.calls.load(Ordering::SeqCst) >= 2);

    let before = view.snapshot().await;
    assert_eq!(before.status.metrics.state, FeedState::Live);
    assert!(before.status.metrics.skipped_ticks > 0);

    view.shutdown().await;

    metrics.release.notify_waiters();
    anomalies.release.notify_waiters();
    transport.send_to_all("GET / 500");
    tokio::time::sleep(Duration::from_secs(120)).await;

    let after = view.snapshot().await;
    assert_eq!(after.series, before.series);
    assert_eq!(after.anomalies, before.anomalies);
    assert_eq!(after.status.metrics, before.status.metrics);
    assert!(after
        .status
        .streams
        .iter()
        .all(|stream| stream.state == ConnectionState::Closed));

    let reader = view.reader();
    for category in LogCategory::ALL {
        let lines = reader.logs(category, Order::Oldest).await.unwrap();
        let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        let connected = format!("--- Connected to {category} log stream ---");
        assert_eq!(texts, vec![connected.as_str(), "GET / 200"]);
    }
}

#[tokio::test(start_paused = true)]
async fn one_poll_stamps_every_series_with_one_time() {
    let metrics = HeldSource::new();
    let mut view = ObservabilityView::new(
        config(),
        Sources {
            metrics: metrics.clone(),
            anomalies: None,
            transport: Arc::new(ChannelTransport::default()),
        },
    )
    .unwrap();
    view.start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let series = view.reader().series().await;
    assert_eq!(series.series.len(), MetricField::ALL.len());

    let stamps: Vec<_> = series
        .series
        .values()
        .map(|points| {
            assert_eq!(points.len(), 1);
            points[0].t
        })
        .collect();
    assert!(stamps.windows(2).all(|pair| pair[0] == pair[1]));

    view.shutdown().await;
}

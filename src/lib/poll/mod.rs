//! Fixed-cadence polling shared by the metrics poller and the anomaly joiner.
//!
//! Ticks are scheduled on a fixed period from the first tick, so a slow fetch
//! does not shift later ticks. A tick that fires while the previous fetch is
//! still in flight is skipped, which bounds concurrency to one request and
//! keeps results in completion order.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use futures::{
    future::{BoxFuture, Fuse, FusedFuture},
    FutureExt,
};
use serde::Serialize;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::*;

use crate::helper::lifetime::Lifetime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// A response arrived but its body could not be understood.
    #[error("malformed payload: {0}")]
    Shape(String),
}

impl FetchError {
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    /// No fetch has completed yet.
    #[default]
    Waiting,
    Live,
    /// The last fetch failed; the series still hold their previous values.
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedStatus {
    pub state: FeedState,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub skipped_ticks: u64,
    pub dropped_ticks: u64,
}

impl FeedStatus {
    fn mark_live(&mut self, at: DateTime<Utc>) {
        self.state = FeedState::Live;
        self.last_success = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    fn mark_stale(&mut self, error: &FetchError) {
        self.state = FeedState::Stale;
        self.last_error = Some(error.to_string());
        self.consecutive_failures += 1;
        if error.is_shape() {
            self.dropped_ticks += 1;
        }
    }
}

/// Runs until `lifetime` ends or the task is aborted.
///
/// `fetch` is only called when no other fetch is outstanding. `apply` receives
/// each result together with its local completion time. Applying a result and
/// every status update happen under the lifetime guard.
pub async fn run<T, F, A, Fut>(
    name: &'static str,
    interval: Duration,
    lifetime: &Lifetime,
    status: &watch::Sender<FeedStatus>,
    mut fetch: F,
    mut apply: A,
) where
    F: FnMut() -> BoxFuture<'static, Result<T, FetchError>>,
    A: FnMut(T, DateTime<Utc>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let in_flight: Fuse<BoxFuture<'static, Result<T, FetchError>>> = Fuse::terminated();
    tokio::pin!(in_flight);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !in_flight.is_terminated() {
                    let Some(_guard) = lifetime.guard().await else {
                        debug!("{name}: owner is gone, stopping");
                        return;
                    };
                    status.send_modify(|status| status.skipped_ticks += 1);
                    debug!("{name}: previous fetch still in flight, skipping tick");
                    continue;
                }

                trace!("{name}: fetching");
                in_flight.set(fetch().fuse());
            }
            result = &mut in_flight, if !in_flight.is_terminated() => {
                let completed_at = Utc::now();

                let Some(_guard) = lifetime.guard().await else {
                    debug!("{name}: owner is gone, discarding result");
                    return;
                };

                match result {
                    Ok(value) => {
                        apply(value, completed_at).await;
                        status.send_modify(|status| status.mark_live(completed_at));
                    }
                    Err(error) => {
                        warn!("{name}: fetch failed, keeping previous values: {error}");
                        status.send_modify(|status| status.mark_stale(&error));
                    }
                }
            }
        }
    }
}

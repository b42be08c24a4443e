use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::*;

use crate::buffer::{Order, RingBuffer};

use super::types::{AnomalyFeed, AnomalyPoint};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalySnapshot {
    pub points: Vec<AnomalyPoint>,
    pub watermark: Option<DateTime<Utc>>,
    pub unparsable_records: u64,
    /// Detections that arrived after newer points were already appended.
    pub late_points: u64,
}

/// Bounded anomaly series fed with replayed detector windows.
///
/// Every poll returns the whole lookback window again. A record is appended
/// once per `(t, method, metric)` while that point is retained. The detector
/// refits over its window, so a record older than the newest point can still
/// show up later. Such a record is merged in time order.
#[derive(Debug)]
pub struct AnomalySeries {
    buffer: RingBuffer<AnomalyPoint>,
    watermark: Option<DateTime<Utc>>,
    unparsable_records: u64,
    late_points: u64,
}

fn same_detection(a: &AnomalyPoint, b: &AnomalyPoint) -> bool {
    a.t == b.t && a.method == b.method && a.metric == b.metric
}

impl AnomalySeries {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            watermark: None,
            unparsable_records: 0,
            late_points: 0,
        }
    }

    /// Appends the records of `feed` not retained yet, keeping the series in
    /// time order. Returns how many were appended.
    pub fn ingest(&mut self, feed: &AnomalyFeed, default_metric: &str) -> usize {
        let mut points: Vec<AnomalyPoint> = Vec::with_capacity(feed.anomalies.len());
        for record in &feed.anomalies {
            match record.to_point(default_metric) {
                Ok(point) => points.push(point),
                Err(error) => {
                    self.unparsable_records += 1;
                    warn!("Skipping anomaly record with timestamp {:?}: {error}", record.ts);
                }
            }
        }

        points.sort_by_key(|point| point.t);

        // Out of the window once the buffer is full.
        let floor = self
            .buffer
            .is_full()
            .then(|| self.buffer.oldest().map(|point| point.t))
            .flatten();

        let mut fresh: Vec<AnomalyPoint> = Vec::with_capacity(points.len());
        for point in points {
            if floor.is_some_and(|floor| point.t < floor) {
                continue;
            }
            let known = self
                .buffer
                .iter()
                .chain(fresh.iter())
                .any(|retained| same_detection(retained, &point));
            if !known {
                fresh.push(point);
            }
        }

        if fresh.is_empty() {
            return 0;
        }

        let late = match self.watermark {
            Some(watermark) => fresh.iter().filter(|point| point.t <= watermark).count(),
            None => 0,
        };

        let appended = fresh.len();
        if late == 0 {
            for point in fresh {
                self.buffer.push(point);
            }
        } else {
            self.late_points += late as u64;
            debug!("Merging {late} late anomaly points into the series");

            let mut merged: Vec<AnomalyPoint> = self.buffer.iter().cloned().collect();
            merged.extend(fresh);
            merged.sort_by_key(|point| point.t);

            let mut buffer = RingBuffer::new(self.buffer.capacity());
            for point in merged {
                buffer.push(point);
            }
            self.buffer = buffer;
        }

        self.watermark = self.buffer.newest().map(|point| point.t).max(self.watermark);
        debug!("Appended {appended} new anomaly points");

        appended
    }

    pub fn snapshot(&self) -> AnomalySnapshot {
        AnomalySnapshot {
            points: self.buffer.snapshot(Order::Oldest),
            watermark: self.watermark,
            unparsable_records: self.unparsable_records,
            late_points: self.late_points,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

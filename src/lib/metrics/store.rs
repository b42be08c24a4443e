use std::{
    collections::{BTreeMap, HashMap, HashSet},
    num::NonZeroUsize,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::*;

use crate::buffer::{Order, RingBuffer};

use super::{
    rate::{derive_rate, RateSample, RateStatus},
    types::{FieldValue, MetricField, MetricSnapshot, SeriesPoint},
};

pub const DEFAULT_SERIES_CAPACITY: usize = 30;

/// Copy of every series, safe to hand to a renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub series: BTreeMap<String, Vec<SeriesPoint>>,
    pub rate_status: BTreeMap<String, RateStatus>,
    pub counter_resets: u64,
}

/// Owns one bounded buffer per named series and the last reading of every
/// counter-backed series.
#[derive(Debug)]
pub struct SeriesStore {
    capacity: NonZeroUsize,
    series: BTreeMap<String, RingBuffer<SeriesPoint>>,
    baselines: HashMap<String, u64>,
    rate_status: BTreeMap<String, RateStatus>,
    counter_resets: u64,
}

impl SeriesStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            series: BTreeMap::new(),
            baselines: HashMap::new(),
            rate_status: BTreeMap::new(),
            counter_resets: 0,
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn append(&mut self, name: &str, point: SeriesPoint) {
        let capacity = self.capacity;
        self.series
            .entry(name.to_string())
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(point);
    }

    /// Diffs `cumulative` against the stored baseline and appends the interval
    /// count. The baseline always moves to `cumulative`, resets included.
    pub fn record_counter(&mut self, name: &str, t: DateTime<Utc>, cumulative: u64) -> RateSample {
        let previous = self.baselines.insert(name.to_string(), cumulative);
        let sample = derive_rate(previous, cumulative);

        if sample.status == RateStatus::CounterReset {
            self.counter_resets += 1;
            info!(
                "Counter reset detected on {name}: {} -> {cumulative}",
                previous.unwrap_or_default()
            );
        }

        self.rate_status.insert(name.to_string(), sample.status);
        self.append(
            name,
            SeriesPoint {
                t,
                v: sample.value as f64,
            },
        );

        sample
    }

    /// Appends one point per tracked field, all stamped with the snapshot's
    /// `fetched_at`. A field listed twice is applied once.
    pub fn apply_snapshot(&mut self, snapshot: &MetricSnapshot, tracked: &[MetricField]) {
        let t = snapshot.fetched_at;
        let mut applied = HashSet::with_capacity(tracked.len());

        for field in tracked {
            if !applied.insert(*field) {
                continue;
            }

            let name = field.series_name();
            match field.read(snapshot) {
                FieldValue::Gauge(v) => self.append(name, SeriesPoint { t, v }),
                FieldValue::Counter(cumulative) => {
                    self.record_counter(name, t, cumulative);
                }
            }
        }

        trace!("Applied metric snapshot from {t} to {} series", applied.len());
    }

    pub fn snapshot(&self, name: &str) -> Option<Vec<SeriesPoint>> {
        self.series
            .get(name)
            .map(|buffer| buffer.snapshot(Order::Oldest))
    }

    pub fn snapshot_all(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            series: self
                .series
                .iter()
                .map(|(name, buffer)| (name.clone(), buffer.snapshot(Order::Oldest)))
                .collect(),
            rate_status: self.rate_status.clone(),
            counter_resets: self.counter_resets,
        }
    }

    pub fn series_names(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }
}

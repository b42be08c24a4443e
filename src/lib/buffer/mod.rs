use std::num::NonZeroUsize;

use ringbuffer::{AllocRingBuffer, RingBuffer as _};
use serde::{Deserialize, Serialize};

/// Order in which a [`RingBuffer`] snapshot is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Insertion order, for left-to-right chart plotting.
    #[default]
    Oldest,
    /// Reverse insertion order, for top-of-screen log views.
    Newest,
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(format!("unknown order: {other:?} (expected oldest|newest)")),
        }
    }
}

/// Fixed-capacity buffer that keeps the most recent items.
///
/// Pushing into a full buffer evicts the oldest item in the same call, so the
/// length never goes above the capacity.
pub struct RingBuffer<T> {
    inner: AllocRingBuffer<T>,
    capacity: NonZeroUsize,
    pushed: u64,
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.inner.len())
            .field("capacity", &self.capacity)
            .field("pushed", &self.pushed)
            .finish()
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: AllocRingBuffer::new(capacity.get()),
            capacity,
            pushed: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.inner.push(item);
        self.pushed += 1;
    }

    /// Copy of the retained items in the requested order.
    pub fn snapshot(&self, order: Order) -> Vec<T> {
        let mut items = self.inner.to_vec();
        if order == Order::Newest {
            items.reverse();
        }
        items
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Number of items ever pushed.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Number of items that were pushed out of the window.
    pub fn evicted(&self) -> u64 {
        self.pushed - self.inner.len() as u64
    }

    pub fn newest(&self) -> Option<&T> {
        self.inner.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.inner.front()
    }

    pub fn is_full(&self) -> bool {
        self.inner.len() == self.capacity.get()
    }

    /// Retained items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.inner.iter()
    }
}

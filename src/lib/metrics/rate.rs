use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStatus {
    Measured,
    /// First observation, nothing to diff against.
    NoBaseline,
    /// The counter went backwards, usually a backend restart.
    CounterReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    pub value: u64,
    pub status: RateStatus,
}

impl RateSample {
    pub fn is_meaningful(&self) -> bool {
        self.status == RateStatus::Measured
    }
}

/// Converts two readings of a cumulative counter into the count for the
/// interval between them. Never negative.
pub fn derive_rate(previous: Option<u64>, current: u64) -> RateSample {
    match previous {
        None => RateSample {
            value: 0,
            status: RateStatus::NoBaseline,
        },
        Some(previous) if current >= previous => RateSample {
            value: current - previous,
            status: RateStatus::Measured,
        },
        Some(_) => RateSample {
            value: 0,
            status: RateStatus::CounterReset,
        },
    }
}

pub mod poller;
pub mod rate;
pub mod store;
pub mod types;

pub use poller::{MetricsPoller, SharedSeriesStore};
pub use rate::{derive_rate, RateSample, RateStatus};
pub use store::{SeriesSnapshot, SeriesStore, DEFAULT_SERIES_CAPACITY};
pub use types::{MetricField, MetricSnapshot, SeriesPoint};

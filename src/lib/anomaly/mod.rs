pub mod joiner;
pub mod series;
pub mod types;

pub use joiner::{AnomalyFeedJoiner, SharedAnomalySeries};
pub use series::{AnomalySeries, AnomalySnapshot};
pub use types::{AnomalyFeed, AnomalyPoint, AnomalyRecord};

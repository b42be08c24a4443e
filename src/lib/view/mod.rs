pub mod manager;
pub mod types;

pub use manager::{ObservabilityView, Sources, ViewReader};
pub use types::{DashboardSnapshot, StreamStatus, ViewConfig, ViewStatus};

use std::{collections::HashSet, num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

use crate::{
    logs::{backoff::BackoffPolicy, LogCategory},
    metrics::{MetricField, DEFAULT_SERIES_CAPACITY},
    view::ViewConfig,
};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HeaderSettingsFile {
    pub name: String,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: Url,
    pub metrics_path: String,
    #[validate(range(min = 100))]
    pub request_timeout_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_reconnect"))]
pub struct StreamSettings {
    pub base_url: Url,
    #[validate(custom = "validate_categories")]
    pub categories: Vec<LogCategory>,
    #[validate(range(min = 1))]
    pub capacity: usize,
    #[validate(range(min = 100))]
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    #[validate(range(min = 1000))]
    pub interval_ms: u64,
    #[validate(range(min = 1))]
    pub series_capacity: usize,
    #[validate(custom = "validate_tracked_series")]
    pub tracked_series: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AnomalySettings {
    pub enabled: bool,
    pub url: Url,
    #[validate(range(min = 1000))]
    pub interval_ms: u64,
    #[validate(range(min = 1))]
    pub capacity: usize,
    #[validate(length(min = 1))]
    pub default_metric: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(range(min = 100))]
    pub push_interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, Validate)]
pub struct SettingsStruct {
    pub header: HeaderSettingsFile,
    #[serde(default)]
    #[validate]
    pub api: ApiSettings,
    #[serde(default)]
    #[validate]
    pub streams: StreamSettings,
    #[serde(default)]
    #[validate]
    pub metrics: MetricsSettings,
    #[serde(default)]
    #[validate]
    pub anomaly: AnomalySettings,
    #[serde(default)]
    #[validate]
    pub server: ServerSettings,
}

fn default_url(url: &str) -> Url {
    // Only called with the literal defaults below.
    Url::parse(url).unwrap()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_url("http://localhost:8000/api"),
            metrics_path: "metrics".to_string(),
            request_timeout_ms: 8000,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            base_url: default_url("ws://localhost:8000/ws/logs"),
            categories: LogCategory::ALL.to_vec(),
            capacity: 200,
            reconnect_initial_ms: backoff.initial.as_millis() as u64,
            reconnect_max_ms: backoff.max.as_millis() as u64,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            tracked_series: MetricField::ALL
                .iter()
                .map(|field| field.series_name().to_string())
                .collect(),
        }
    }
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url("http://localhost:8001/anomalies"),
            interval_ms: 30_000,
            capacity: DEFAULT_SERIES_CAPACITY,
            default_metric: "requests".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            push_interval_ms: 2000,
        }
    }
}

impl Default for SettingsStruct {
    fn default() -> Self {
        SettingsStruct {
            header: HeaderSettingsFile {
                name: "LB Observatory".to_string(),
                version: 0,
            },
            api: ApiSettings::default(),
            streams: StreamSettings::default(),
            metrics: MetricsSettings::default(),
            anomaly: AnomalySettings::default(),
            server: ServerSettings::default(),
        }
    }
}

fn validate_reconnect(streams: &StreamSettings) -> Result<(), ValidationError> {
    if streams.reconnect_initial_ms > streams.reconnect_max_ms {
        let mut error = ValidationError::new("reconnect_range");
        error.message = Some("reconnect_initial_ms must not exceed reconnect_max_ms".into());
        return Err(error);
    }

    Ok(())
}

fn validate_tracked_series(names: &[String]) -> Result<(), ValidationError> {
    if names.is_empty() {
        return Err(ValidationError::new("no_tracked_series"));
    }

    if let Some(unknown) = names
        .iter()
        .find(|name| name.parse::<MetricField>().is_err())
    {
        let mut error = ValidationError::new("unknown_series");
        error.add_param("name".into(), unknown);
        return Err(error);
    }

    let mut seen = HashSet::with_capacity(names.len());
    if let Some(repeated) = names.iter().find(|name| !seen.insert(name.as_str())) {
        let mut error = ValidationError::new("duplicate_series");
        error.add_param("name".into(), repeated);
        return Err(error);
    }

    Ok(())
}

fn validate_categories(categories: &[LogCategory]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(categories.len());
    if let Some(repeated) = categories.iter().find(|category| !seen.insert(**category)) {
        let mut error = ValidationError::new("duplicate_category");
        error.add_param("category".into(), &repeated.as_str());
        return Err(error);
    }

    Ok(())
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

impl SettingsStruct {
    pub fn tracked_series(&self) -> Vec<MetricField> {
        let mut tracked: Vec<MetricField> = Vec::new();
        for field in self
            .metrics
            .tracked_series
            .iter()
            .filter_map(|name| name.parse().ok())
        {
            if !tracked.contains(&field) {
                tracked.push(field);
            }
        }
        tracked
    }

    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            stream_base_url: self.streams.base_url.clone(),
            categories: self.streams.categories.clone(),
            log_capacity: non_zero(self.streams.capacity),
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.streams.reconnect_initial_ms),
                max: Duration::from_millis(self.streams.reconnect_max_ms),
            },
            series_capacity: non_zero(self.metrics.series_capacity),
            tracked_series: self.tracked_series(),
            metrics_interval: Duration::from_millis(self.metrics.interval_ms),
            anomaly_capacity: non_zero(self.anomaly.capacity),
            anomaly_interval: Duration::from_millis(self.anomaly.interval_ms),
            default_anomaly_metric: self.anomaly.default_metric.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SettingsStruct::default();
        assert!(settings.validate().is_ok());

        let config = settings.view_config();
        assert_eq!(config.series_capacity.get(), 30);
        assert_eq!(config.log_capacity.get(), 200);
        assert_eq!(config.metrics_interval, Duration::from_secs(10));
        assert_eq!(config.tracked_series.len(), MetricField::ALL.len());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut settings = SettingsStruct::default();
        settings.metrics.series_capacity = 0;
        settings.metrics.interval_ms = 10;
        settings.streams.reconnect_initial_ms = 20;

        let errors = settings.validate().unwrap_err().to_string();
        assert!(errors.contains("series_capacity"));
        assert!(errors.contains("interval_ms"));
        assert!(errors.contains("reconnect_initial_ms"));
    }

    #[test]
    fn reconnect_range_must_be_ordered() {
        let mut settings = SettingsStruct::default();
        settings.streams.reconnect_initial_ms = 20_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_series_is_rejected() {
        let mut settings = SettingsStruct::default();
        settings.metrics.tracked_series = vec!["active_connections".into(), "rps".into()];
        assert!(settings.validate().is_err());

        settings.metrics.tracked_series = vec!["active_connections".into()];
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tracked_series(), vec![MetricField::ActiveConnections]);
    }

    #[test]
    fn repeated_series_is_rejected() {
        let mut settings = SettingsStruct::default();
        settings.metrics.tracked_series = vec![
            "requests_per_interval".into(),
            "requests_per_interval".into(),
        ];

        let errors = settings.validate().unwrap_err().to_string();
        assert!(errors.contains("tracked_series"));
        assert_eq!(
            settings.tracked_series(),
            vec![MetricField::RequestsPerInterval]
        );
    }

    #[test]
    fn repeated_category_is_rejected() {
        let mut settings = SettingsStruct::default();
        settings.streams.categories = vec![LogCategory::Access, LogCategory::Access];

        let errors = settings.validate().unwrap_err().to_string();
        assert!(errors.contains("categories"));

        settings.streams.categories = vec![LogCategory::Error];
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings: SettingsStruct = serde_json::from_str(
            r#"{"header": {"name": "LB Observatory", "version": 0}, "metrics": {"interval_ms": 5000}}"#,
        )
        .unwrap();

        assert_eq!(settings.metrics.interval_ms, 5000);
        assert_eq!(settings.metrics.series_capacity, DEFAULT_SERIES_CAPACITY);
        assert_eq!(settings.anomaly, AnomalySettings::default());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::*;
use url::Url;

use crate::{anomaly::types::AnomalyFeed, metrics::types::MetricSnapshot, poll::FetchError};

use super::{AnomalySource, MetricsSource};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub api_base_url: Url,
    pub metrics_path: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub api_token: Option<String>,
    pub anomaly_url: Url,
    /// Sent as `X-API-Token: <token>`.
    pub anomaly_token: Option<String>,
    pub request_timeout: Duration,
}

/// HTTP client for the management API and the anomaly detector.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    metrics_url: Url,
    api_token: Option<String>,
    anomaly_url: Url,
    anomaly_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let metrics_url = join_path(&config.api_base_url, &config.metrics_path)?;
        debug!("Metrics endpoint: {metrics_url}, anomaly endpoint: {}", config.anomaly_url);

        Ok(Self {
            http,
            metrics_url,
            api_token: config.api_token,
            anomaly_url: config.anomaly_url,
            anomaly_token: config.anomaly_token,
        })
    }

    pub fn metrics_url(&self) -> &Url {
        &self.metrics_url
    }

    pub fn anomaly_url(&self) -> &Url {
        &self.anomaly_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        serde_json::from_slice(&body).map_err(|error| FetchError::Shape(error.to_string()))
    }
}

#[async_trait]
impl MetricsSource for ApiClient {
    #[instrument(level = "trace", skip(self))]
    async fn fetch_metrics(&self) -> Result<MetricSnapshot, FetchError> {
        let mut request = self.http.get(self.metrics_url.clone());
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        self.get_json(request).await
    }
}

#[async_trait]
impl AnomalySource for ApiClient {
    #[instrument(level = "trace", skip(self))]
    async fn fetch_anomalies(&self) -> Result<AnomalyFeed, FetchError> {
        let mut request = self.http.get(self.anomaly_url.clone());
        if let Some(token) = &self.anomaly_token {
            request = request.header("X-API-Token", token);
        }

        let feed: AnomalyFeed = self.get_json(request).await?;
        if let Some(error) = &feed.error {
            return Err(FetchError::Shape(format!("detector reported: {error}")));
        }

        Ok(feed)
    }
}

/// `<base>/<path>`, tolerating slashes on either side.
fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

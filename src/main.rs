use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::*;

use lb_observatory::{
    api::{AnomalySource, ApiClient, ApiClientConfig},
    cli, logger,
    logs::transport::WebSocketTransport,
    server, settings,
    view::{ObservabilityView, Sources},
};

#[actix_web::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everybody else to register any log information
    logger::manager::init()?;

    let overrides = settings::manager::Overrides {
        api_url: cli::manager::api_url(),
        stream_url: cli::manager::stream_url(),
        anomaly_url: cli::manager::anomaly_url(),
        disable_anomaly: cli::manager::is_anomaly_disabled(),
    };
    settings::manager::init(
        &cli::manager::settings_file(),
        cli::manager::is_reset(),
        &overrides,
    )
    .context("Failed to load settings")?;
    let settings = settings::manager::settings();
    debug!(
        "Settings loaded from {:?}: {settings:#?}",
        settings::manager::file_name()
    );

    let client = Arc::new(ApiClient::new(ApiClientConfig {
        api_base_url: settings.api.base_url.clone(),
        metrics_path: settings.api.metrics_path.clone(),
        api_token: cli::manager::api_token(),
        anomaly_url: settings.anomaly.url.clone(),
        anomaly_token: cli::manager::anomaly_token(),
        request_timeout: Duration::from_millis(settings.api.request_timeout_ms),
    })?);

    let sources = Sources {
        metrics: client.clone(),
        anomalies: settings
            .anomaly
            .enabled
            .then(|| client.clone() as Arc<dyn AnomalySource>),
        transport: Arc::new(WebSocketTransport),
    };

    let mut view = ObservabilityView::new(settings.view_config(), sources)?;
    view.start();

    // The server stops on SIGINT/SIGTERM
    let result = server::manager::run(
        &cli::manager::server_address(),
        view.reader(),
        Duration::from_millis(settings.server.push_interval_ms),
    )
    .await
    .context("Snapshot API failed");

    view.shutdown().await;

    result
}

use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::*;
use tracing_actix_web::TracingLogger;

use crate::view::ViewReader;

use super::pages::{self, PushInterval};

// Start REST API server with the desired address
#[instrument(level = "debug", skip(reader))]
pub async fn run(
    server_address: &str,
    reader: ViewReader,
    push_interval: Duration,
) -> Result<(), std::io::Error> {
    let server_address = server_address.to_string();
    let reader = web::Data::new(reader);
    let push_interval = web::Data::new(PushInterval(push_interval));

    info!("Snapshot API listening on {server_address}");

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .send_wildcard()
                    .max_age(3600),
            )
            .wrap(TracingLogger::default())
            .app_data(reader.clone())
            .app_data(push_interval.clone())
            // Versioned API routes (canonical)
            .service(web::scope("/v1").configure(configure_api_routes))
            // Flat routes, same handlers
            .configure(configure_api_routes)
    })
    .bind(server_address)?
    .run()
    .await
}

/// Register all API routes on a `ServiceConfig`.
/// Used for both the `/v1` scope and the flat routes.
pub fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/info", web::get().to(pages::info))
        .route("/status", web::get().to(pages::status))
        .route("/series", web::get().to(pages::series))
        .route("/series/{name}", web::get().to(pages::series_by_name))
        .route("/anomalies", web::get().to(pages::anomalies))
        .route("/logs/{category}", web::get().to(pages::logs))
        .route("/snapshot/ws", web::get().to(pages::snapshot_ws));
}

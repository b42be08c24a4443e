use actix_web::{rt, web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::*;

use crate::{
    buffer::Order,
    logs::LogCategory,
    server::error::{Error, Result},
    view::ViewReader,
};

#[derive(Debug, Clone, Copy)]
pub struct PushInterval(pub Duration);

#[derive(Debug, Serialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub authors: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    /// Newest first when absent, matching a tailing log view.
    pub order: Option<Order>,
    pub filter: Option<String>,
}

fn json_response<T: Serialize>(value: &T) -> Result<HttpResponse> {
    let json = serde_json::to_string_pretty(value)?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(json))
}

pub async fn info() -> Result<HttpResponse> {
    json_response(&Info {
        name: env!("CARGO_PKG_NAME").into(),
        version: env!("CARGO_PKG_VERSION").into(),
        authors: env!("CARGO_PKG_AUTHORS").into(),
    })
}

/// Feed statuses and stream states
pub async fn status(reader: web::Data<ViewReader>) -> Result<HttpResponse> {
    json_response(&reader.status().await)
}

/// Every series, oldest point first
pub async fn series(reader: web::Data<ViewReader>) -> Result<HttpResponse> {
    json_response(&reader.series().await)
}

pub async fn series_by_name(
    reader: web::Data<ViewReader>,
    name: web::Path<String>,
) -> Result<HttpResponse> {
    let name = name.into_inner();
    let points = reader
        .series_by_name(&name)
        .await
        .ok_or_else(|| Error::NotFound(format!("no series named {name:?}")))?;

    json_response(&points)
}

pub async fn anomalies(reader: web::Data<ViewReader>) -> Result<HttpResponse> {
    json_response(&reader.anomalies().await)
}

pub async fn logs(
    reader: web::Data<ViewReader>,
    category: web::Path<String>,
    query: web::Query<LogsQuery>,
) -> Result<HttpResponse> {
    let category: LogCategory = category.parse().map_err(Error::BadRequest)?;
    let filter = query.filter.as_deref().map(Regex::new).transpose()?;

    let lines = reader
        .logs(category, query.order.unwrap_or(Order::Newest))
        .await
        .ok_or_else(|| Error::NotFound(format!("{category} logs are not streamed")))?;

    let lines: Vec<_> = match filter {
        Some(filter) => lines
            .into_iter()
            .filter(|line| filter.is_match(&line.text))
            .collect(),
        None => lines,
    };

    json_response(&lines)
}

/// Pushes the full dashboard snapshot whenever it changes.
pub async fn snapshot_ws(
    req: HttpRequest,
    stream: web::Payload,
    reader: web::Data<ViewReader>,
    push_interval: web::Data<PushInterval>,
) -> Result<HttpResponse> {
    let (response, mut session, mut msg_stream) =
        actix_ws::handle(&req, stream).map_err(|error| Error::Internal(format!("{error:?}")))?;

    let reader = reader.into_inner();
    let period = push_interval.0;

    rt::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut last_snapshot = String::new();

        loop {
            tokio::select! {
                Some(msg) = msg_stream.next() => {
                    match msg {
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Text(_)) | Ok(Message::Binary(_)) | Ok(Message::Continuation(_)) | Ok(Message::Nop) => continue,
                        Ok(Message::Close(_)) | Err(_) => break,
                    }
                }
                _ = interval.tick() => {
                    let snapshot = match serde_json::to_string(&reader.snapshot().await) {
                        Ok(snapshot) => snapshot,
                        Err(error) => {
                            warn!("Failed to serialize dashboard snapshot: {error:?}");
                            continue;
                        }
                    };

                    if snapshot == last_snapshot {
                        continue;
                    }

                    if session.text(snapshot.clone()).await.is_err() {
                        break;
                    }
                    last_snapshot = snapshot;
                }
            }
        }

        debug!("Snapshot websocket closed");
        let _ = session.close(None).await;
    });

    Ok(response)
}

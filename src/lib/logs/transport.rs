use async_trait::async_trait;
use async_tungstenite::tungstenite;
use futures::{stream::BoxStream, StreamExt};
use tracing::*;
use url::Url;

/// Lines delivered by one live connection, in transport order. The stream ends
/// when the peer closes the channel.
pub type LineStream = BoxStream<'static, Result<String, TransportError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

/// Opens one streaming channel to a log source.
#[async_trait]
pub trait LogTransport: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<LineStream, TransportError>;
}

/// WebSocket transport: text frames are lines, binary frames are decoded
/// lossily and a close frame ends the stream.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

#[async_trait]
impl LogTransport for WebSocketTransport {
    #[instrument(level = "debug", skip(self))]
    async fn connect(&self, url: &Url) -> Result<LineStream, TransportError> {
        let (ws_stream, _response) = async_tungstenite::tokio::connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        debug!("WebSocket connected to {url}");

        let lines = futures::stream::unfold(Some(ws_stream), |ws_stream| async move {
            let mut ws_stream = ws_stream?;
            loop {
                let message = match ws_stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        return Some((Err(TransportError::Receive(error.to_string())), None))
                    }
                    None => return None,
                };

                match message {
                    tungstenite::Message::Text(text) => return Some((Ok(text), Some(ws_stream))),
                    tungstenite::Message::Binary(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).to_string();
                        return Some((Ok(text), Some(ws_stream)));
                    }
                    tungstenite::Message::Close(frame) => {
                        trace!("WebSocket closed by peer: {frame:?}");
                        return None;
                    }
                    tungstenite::Message::Ping(_)
                    | tungstenite::Message::Pong(_)
                    | tungstenite::Message::Frame(_) => continue,
                }
            }
        });

        Ok(lines.boxed())
    }
}

/// `<base>/<category>`, tolerating a trailing slash on the base.
pub fn category_url(base: &Url, category: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{category}",
        base.as_str().trim_end_matches('/')
    ))
}

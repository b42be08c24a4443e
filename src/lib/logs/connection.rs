use std::{num::NonZeroUsize, ops::ControlFlow, sync::Arc};

use futures::StreamExt;
use tokio::sync::{watch, RwLock};
use tracing::*;
use url::Url;

use crate::{
    buffer::{Order, RingBuffer},
    helper::lifetime::Lifetime,
};

use super::{
    backoff::{Backoff, BackoffPolicy},
    transport::LogTransport,
    types::{ConnectionState, LogCategory, LogLine},
};

pub type SharedLogBuffer = Arc<RwLock<RingBuffer<LogLine>>>;

/// One persistent, reconnecting log stream for a single category.
///
/// A single task owns the connect/read/backoff loop, so there is never more
/// than one live connection per instance.
pub struct StreamConnection {
    category: LogCategory,
    url: Url,
    backoff: BackoffPolicy,
    buffer: SharedLogBuffer,
    state: Arc<watch::Sender<ConnectionState>>,
    lifetime: Lifetime,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("category", &self.category)
            .field("url", &self.url.as_str())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Everything the connection task needs, cloned out of the owner.
struct Session {
    category: LogCategory,
    url: Url,
    buffer: SharedLogBuffer,
    state: Arc<watch::Sender<ConnectionState>>,
    lifetime: Lifetime,
}

impl StreamConnection {
    pub fn new(category: LogCategory, url: Url, capacity: NonZeroUsize, backoff: BackoffPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            category,
            url,
            backoff,
            buffer: Arc::new(RwLock::new(RingBuffer::new(capacity))),
            state: Arc::new(state),
            lifetime: Lifetime::new(),
            task: None,
        }
    }

    pub fn category(&self) -> LogCategory {
        self.category
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn buffer(&self) -> SharedLogBuffer {
        self.buffer.clone()
    }

    pub async fn snapshot(&self, order: Order) -> Vec<LogLine> {
        self.buffer.read().await.snapshot(order)
    }

    /// Starts the connection loop. Does nothing if it is already running or
    /// the connection was closed.
    #[instrument(level = "debug", skip(self, transport), fields(category = %self.category))]
    pub fn open(&mut self, transport: Arc<dyn LogTransport>) {
        if self.state() == ConnectionState::Closed {
            warn!("Refusing to open a closed {} log stream", self.category);
            return;
        }

        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("{} log stream is already open", self.category);
            return;
        }

        let session = Session {
            category: self.category,
            url: self.url.clone(),
            buffer: self.buffer.clone(),
            state: self.state.clone(),
            lifetime: self.lifetime.clone(),
        };
        let backoff = Backoff::new(self.backoff);

        let span = span!(Level::DEBUG, "log_stream", category = %self.category);
        self.task = Some(tokio::spawn(
            session.run(transport, backoff).instrument(span),
        ));
    }

    /// Cancels any pending reconnect, releases the transport and moves to
    /// `Closed`. Idempotent.
    #[instrument(level = "debug", skip(self), fields(category = %self.category))]
    pub async fn close(&mut self) {
        self.lifetime.end().await;

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        self.state.send_replace(ConnectionState::Closed);
        debug!("{} log stream closed", self.category);
    }
}

impl Session {
    async fn run(self, transport: Arc<dyn LogTransport>, mut backoff: Backoff) {
        let mut failure_streak: u32 = 0;

        loop {
            if self.transition(ConnectionState::Connecting).await.is_break() {
                return;
            }

            match transport.connect(&self.url).await {
                Ok(mut lines) => {
                    failure_streak = 0;
                    backoff.reset();

                    if self.transition(ConnectionState::Connected).await.is_break()
                        || self.push(LogLine::connected(self.category)).await.is_break()
                    {
                        return;
                    }
                    info!("Connected to {} log stream at {}", self.category, self.url);

                    let reason = loop {
                        match lines.next().await {
                            Some(Ok(text)) => {
                                if self
                                    .push(LogLine::message(self.category, text))
                                    .await
                                    .is_break()
                                {
                                    return;
                                }
                            }
                            Some(Err(error)) => break Some(error.to_string()),
                            None => break None,
                        }
                    };

                    match &reason {
                        Some(reason) => {
                            warn!("{} log stream dropped: {reason}", self.category)
                        }
                        None => info!("{} log stream closed by peer", self.category),
                    }

                    if self
                        .push(LogLine::disconnected(self.category, reason.as_deref()))
                        .await
                        .is_break()
                    {
                        return;
                    }
                }
                Err(error) => {
                    failure_streak += 1;
                    if failure_streak == 1 {
                        warn!("Failed to connect to {} log stream: {error}", self.category);
                        if self
                            .push(LogLine::connect_failed(self.category, &error.to_string()))
                            .await
                            .is_break()
                        {
                            return;
                        }
                    } else {
                        debug!(
                            "Failed to connect to {} log stream ({failure_streak} attempts in a row): {error}",
                            self.category
                        );
                    }
                }
            }

            if self.transition(ConnectionState::Reconnecting).await.is_break() {
                return;
            }

            let delay = backoff.next_delay();
            trace!("Reconnecting {} log stream in {delay:?}", self.category);
            tokio::time::sleep(delay).await;
        }
    }

    async fn push(&self, line: LogLine) -> ControlFlow<()> {
        let Some(_alive) = self.lifetime.guard().await else {
            return ControlFlow::Break(());
        };
        self.buffer.write().await.push(line);
        ControlFlow::Continue(())
    }

    async fn transition(&self, state: ConnectionState) -> ControlFlow<()> {
        let Some(_alive) = self.lifetime.guard().await else {
            return ControlFlow::Break(());
        };
        self.state.send_replace(state);
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use futures::channel::mpsc;
    use tracing_test::traced_test;

    use super::*;
    use crate::logs::{
        transport::{LineStream, TransportError},
        types::LogLineKind,
    };

    enum Script {
        /// Deliver the lines, then close the channel.
        Closing(Vec<&'static str>),
        /// Deliver the lines and keep the channel open.
        Holding(Vec<&'static str>),
        /// Hand the receiving end of a channel to the connection.
        Channel(mpsc::UnboundedReceiver<Result<String, TransportError>>),
        Refuse,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Script>>,
        connects: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                connects: Mutex::new(0),
            })
        }

        fn connects(&self) -> u32 {
            *self.connects.lock().unwrap()
        }
    }

    #[async_trait]
    impl LogTransport for ScriptedTransport {
        async fn connect(&self, _url: &Url) -> Result<LineStream, TransportError> {
            *self.connects.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            let to_stream = |lines: Vec<&'static str>| {
                futures::stream::iter(lines.into_iter().map(|line| Ok(line.to_string())))
            };

            match next {
                Some(Script::Closing(lines)) => Ok(to_stream(lines).boxed()),
                Some(Script::Holding(lines)) => {
                    Ok(to_stream(lines).chain(futures::stream::pending()).boxed())
                }
                Some(Script::Channel(receiver)) => Ok(receiver.boxed()),
                Some(Script::Refuse) => Err(TransportError::Connect("refused".into())),
                None => futures::future::pending().await,
            }
        }
    }

    fn connection() -> StreamConnection {
        StreamConnection::new(
            LogCategory::Access,
            Url::parse("ws://localhost:8000/ws/logs/access").unwrap(),
            NonZeroUsize::new(50).unwrap(),
            BackoffPolicy::default(),
        )
    }

    async fn wait_for_lines(connection: &StreamConnection, count: usize) -> Vec<LogLine> {
        for _ in 0..1000 {
            let lines = connection.snapshot(Order::Oldest).await;
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        connection.snapshot(Order::Oldest).await
    }

    fn texts(lines: &[LogLine]) -> Vec<String> {
        lines.iter().map(|line| line.text.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_gap_is_marked_in_order() {
        let transport = ScriptedTransport::new(vec![
            Script::Closing(vec!["A", "B"]),
            Script::Holding(vec!["C"]),
        ]);
        let mut connection = connection();
        connection.open(transport.clone());

        let lines = wait_for_lines(&connection, 6).await;
        assert_eq!(
            texts(&lines),
            vec![
                "--- Connected to access log stream ---",
                "A",
                "B",
                "--- Disconnected from access log stream ---",
                "--- Connected to access log stream ---",
                "C",
            ]
        );
        assert_eq!(
            lines.iter().map(|line| line.kind).collect::<Vec<_>>(),
            vec![
                LogLineKind::Connected,
                LogLineKind::Message,
                LogLineKind::Message,
                LogLineKind::Disconnected,
                LogLineKind::Connected,
                LogLineKind::Message,
            ]
        );
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(transport.connects(), 2);

        connection.close().await;
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn session_logs_stay_in_the_stream_span() {
        let transport = ScriptedTransport::new(vec![Script::Holding(vec!["A"])]);
        let mut connection = connection();
        connection.open(transport);

        wait_for_lines(&connection, 2).await;
        assert!(logs_contain("log_stream"));
        assert!(logs_contain("Connected to access log stream at"));

        connection.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_are_marked_once_per_streak() {
        let transport = ScriptedTransport::new(vec![
            Script::Refuse,
            Script::Refuse,
            Script::Refuse,
            Script::Holding(vec!["up"]),
        ]);
        let mut connection = connection();
        connection.open(transport.clone());

        let lines = wait_for_lines(&connection, 3).await;
        assert_eq!(
            lines.iter().map(|line| line.kind).collect::<Vec<_>>(),
            vec![
                LogLineKind::ConnectFailed,
                LogLineKind::Connected,
                LogLineKind::Message,
            ]
        );
        assert_eq!(transport.connects(), 4);

        connection.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn open_twice_keeps_a_single_connection() {
        let transport = ScriptedTransport::new(vec![Script::Holding(vec![])]);
        let mut connection = connection();
        connection.open(transport.clone());
        connection.open(transport.clone());

        wait_for_lines(&connection, 1).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.connects(), 1);

        connection.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_lines_are_buffered_after_close() {
        let (sender, receiver) = mpsc::unbounded();
        let transport = ScriptedTransport::new(vec![Script::Channel(receiver)]);
        let mut connection = connection();
        connection.open(transport);

        sender.unbounded_send(Ok("A".to_string())).unwrap();
        let lines = wait_for_lines(&connection, 2).await;
        assert_eq!(texts(&lines)[1], "A");

        connection.close().await;
        connection.close().await;
        let _ = sender.unbounded_send(Ok("B".to_string()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(connection.snapshot(Order::Oldest).await.len(), 2);
        assert_eq!(connection.state(), ConnectionState::Closed);

        connection.open(ScriptedTransport::new(vec![Script::Holding(vec!["late"])]));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connection.snapshot(Order::Oldest).await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_is_reported_in_marker() {
        let (sender, receiver) = mpsc::unbounded();
        let transport = ScriptedTransport::new(vec![Script::Channel(receiver)]);
        let mut connection = connection();
        connection.open(transport);

        sender
            .unbounded_send(Err(TransportError::Receive("reset by peer".into())))
            .unwrap();

        let lines = wait_for_lines(&connection, 2).await;
        assert_eq!(
            lines[1].text,
            "--- Disconnected from access log stream: receive failed: reset by peer ---"
        );

        connection.close().await;
    }
}

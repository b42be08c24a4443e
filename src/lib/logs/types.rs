use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend log source tailed by a [`super::connection::StreamConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Access,
    Error,
}

impl LogCategory {
    pub const ALL: [LogCategory; 2] = [LogCategory::Access, LogCategory::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(Self::Access),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log category: {other:?} (expected access|error)"
            )),
        }
    }
}

/// What produced a [`LogLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLineKind {
    /// A message delivered by the transport, kept verbatim.
    Message,
    Connected,
    Disconnected,
    ConnectFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub category: LogCategory,
    pub kind: LogLineKind,
}

impl LogLine {
    pub fn message(category: LogCategory, text: String) -> Self {
        Self {
            text,
            received_at: Utc::now(),
            category,
            kind: LogLineKind::Message,
        }
    }

    pub fn connected(category: LogCategory) -> Self {
        Self::marker(
            category,
            LogLineKind::Connected,
            format!("--- Connected to {category} log stream ---"),
        )
    }

    pub fn disconnected(category: LogCategory, reason: Option<&str>) -> Self {
        let text = match reason {
            Some(reason) => format!("--- Disconnected from {category} log stream: {reason} ---"),
            None => format!("--- Disconnected from {category} log stream ---"),
        };
        Self::marker(category, LogLineKind::Disconnected, text)
    }

    pub fn connect_failed(category: LogCategory, reason: &str) -> Self {
        Self::marker(
            category,
            LogLineKind::ConnectFailed,
            format!("--- Failed to connect to {category} log stream: {reason} ---"),
        )
    }

    fn marker(category: LogCategory, kind: LogLineKind, text: String) -> Self {
        Self {
            text,
            received_at: Utc::now(),
            category,
            kind,
        }
    }

    pub fn is_marker(&self) -> bool {
        self.kind != LogLineKind::Message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

pub mod backoff;
pub mod connection;
pub mod transport;
pub mod types;

pub use connection::StreamConnection;
pub use types::{ConnectionState, LogCategory, LogLine, LogLineKind};

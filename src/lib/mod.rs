#[macro_use]
extern crate lazy_static;
extern crate tracing;

pub mod anomaly;
pub mod api;
pub mod buffer;
pub mod cli;
pub mod helper;
pub mod logger;
pub mod logs;
pub mod metrics;
pub mod poll;
pub mod server;
pub mod settings;
pub mod view;

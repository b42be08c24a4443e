use std::sync::Arc;

use clap::Parser;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
pub struct Args {
    /// Settings file. A relative name is placed in the user configuration folder.
    #[arg(long, value_name = "PATH", default_value = "settings.json")]
    settings_file: String,

    /// Overwrites the settings file with the default settings before starting.
    #[arg(long)]
    reset: bool,

    /// Management API base URL, overrides the settings file.
    #[arg(long, value_name = "URL")]
    api_url: Option<Url>,

    /// Bearer token for the management API.
    #[arg(long, value_name = "TOKEN", env = "LB_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Base URL of the log streams; `/<category>` is appended per stream.
    #[arg(long, value_name = "URL")]
    stream_url: Option<Url>,

    /// Anomaly detector feed URL, overrides the settings file.
    #[arg(long, value_name = "URL")]
    anomaly_url: Option<Url>,

    /// Token for the anomaly detector.
    #[arg(long, value_name = "TOKEN", env = "LB_ANOMALY_TOKEN", hide_env_values = true)]
    anomaly_token: Option<String>,

    /// Does not poll the anomaly detector.
    #[arg(long)]
    disable_anomaly: bool,

    /// Address of the local snapshot API.
    #[arg(long, value_name = "IP:PORT", default_value = "0.0.0.0:6030")]
    rest_server: String,

    /// Turns all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,

    /// Specifies the path in which the logs will be stored.
    #[arg(long, default_value = "./logs")]
    log_path: Option<String>,

    /// Turns all log categories up to Trace to the log file, for more information check RUST_LOG env variable.
    #[arg(long)]
    enable_tracing_level_log_file: bool,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_tracing() -> bool {
    MANAGER.clap_matches.enable_tracing_level_log_file
}

pub fn is_reset() -> bool {
    MANAGER.clap_matches.reset
}

pub fn settings_file() -> String {
    MANAGER.clap_matches.settings_file.clone()
}

pub fn log_path() -> String {
    let log_path = MANAGER
        .clap_matches
        .log_path
        .clone()
        .unwrap_or_else(|| "./logs".to_string());

    std::fs::canonicalize(&log_path)
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or(log_path)
}

// Return the desired address for the REST API
pub fn server_address() -> String {
    MANAGER.clap_matches.rest_server.clone()
}

pub fn api_url() -> Option<Url> {
    MANAGER.clap_matches.api_url.clone()
}

pub fn api_token() -> Option<String> {
    MANAGER.clap_matches.api_token.clone()
}

pub fn stream_url() -> Option<Url> {
    MANAGER.clap_matches.stream_url.clone()
}

pub fn anomaly_url() -> Option<Url> {
    MANAGER.clap_matches.anomaly_url.clone()
}

pub fn anomaly_token() -> Option<String> {
    MANAGER.clap_matches.anomaly_token.clone()
}

pub fn is_anomaly_disabled() -> bool {
    MANAGER.clap_matches.disable_anomaly
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return a clone of current Args struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn reset_help_describes_overwrite() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("Overwrites the settings file with the default settings"));
    }

    #[test]
    fn defaults_without_arguments() {
        let args = Args::try_parse_from(["lb-observatory"]).unwrap();
        assert_eq!(args.settings_file, "settings.json");
        assert_eq!(args.rest_server, "0.0.0.0:6030");
        assert!(!args.disable_anomaly);
        assert!(args.api_url.is_none());
    }

    #[test]
    fn endpoints_are_parsed_as_urls() {
        let args = Args::try_parse_from([
            "lb-observatory",
            "--api-url",
            "https://lb.example.com/api",
            "--stream-url",
            "wss://lb.example.com/ws/logs",
            "--disable-anomaly",
        ])
        .unwrap();
        assert_eq!(args.api_url.unwrap().host_str(), Some("lb.example.com"));
        assert_eq!(args.stream_url.unwrap().scheme(), "wss");
        assert!(args.disable_anomaly);

        assert!(Args::try_parse_from(["lb-observatory", "--api-url", "not a url"]).is_err());
    }
}

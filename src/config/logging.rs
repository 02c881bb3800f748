use serde::Deserialize;

/// Structured logging configuration.
///
/// Controls the `tracing` subscriber installed by
/// [`crate::telemetry::init_tracing`].
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Can be overridden at runtime via the `RUST_LOG` environment variable.
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show the module path (target) in log messages.
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

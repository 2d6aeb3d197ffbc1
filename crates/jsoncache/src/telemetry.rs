//! Logging setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a global subscriber. Later calls are ignored.
///
/// The filter comes from `RUST_LOG`, then `LOG_LEVEL` (a level name or a
/// numeric level such as `20`), then defaults to `info`.
pub fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| level_directive(&v))
            .unwrap_or("info");
        EnvFilter::new(level)
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_thread_names(true),
            )
            .try_init(),
    };
}

fn level_directive(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" | "5" => Some("trace"),
        "debug" | "10" => Some("debug"),
        "info" | "20" => Some("info"),
        "warn" | "warning" | "30" => Some("warn"),
        "error" | "critical" | "40" | "50" => Some("error"),
        _ => None,
    }
}

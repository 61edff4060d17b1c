use anyhow::{anyhow, bail, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// How the process logs. Built from [`Config`](crate::config::Config) and
/// handed to [`init`] once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub level: String,
}

/// Map a level name to a filter. `panic` and `fatal` have no tracing
/// equivalent and are treated as `error`.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "panic" | "fatal" | "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        other => bail!(
            "unknown log level {other:?} (expected panic, fatal, error, warning, info, debug or trace)"
        ),
    };
    Ok(level)
}

/// `RUST_LOG` wins when set and valid; otherwise our own crates and
/// tower_http log at the configured level and everything else at warn.
pub fn env_filter(level: LevelFilter) -> EnvFilter {
    if let Ok(f) = EnvFilter::try_from_default_env() {
        return f;
    }
    EnvFilter::new(format!(
        "warn,plugin_adapter={level},server={level},tower_http={level}"
    ))
}

pub fn init(settings: &LogSettings) -> Result<()> {
    let level = parse_level(&settings.level)?;
    let registry = tracing_subscriber::registry().with(env_filter(level));

    let installed = match settings.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

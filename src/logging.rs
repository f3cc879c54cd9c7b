use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation as AppenderRotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Log file rotation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl Rotation {
    fn to_appender(self) -> AppenderRotation {
        match self {
            Rotation::Hourly => AppenderRotation::HOURLY,
            Rotation::Daily => AppenderRotation::DAILY,
            Rotation::Never => AppenderRotation::NEVER,
        }
    }
}

/// Filter directives for the subscriber
///
/// sqlx logs every statement at info; batch archival runs issue thousands, so
/// it is capped at warn unless the configured level mentions sqlx itself.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.split(',').any(|d| d.trim_start().starts_with("sqlx")) {
        level.to_string()
    } else if level.is_empty() {
        "info,sqlx=warn".to_string()
    } else {
        format!("{},sqlx=warn", level)
    }
}

/// Install the global subscriber: rolling file output, plus stdout in text
/// mode. `RUST_LOG` overrides the configured level. The guard must outlive
/// the process or buffered lines are lost.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let file_appender = RollingFileAppender::builder()
        .rotation(config.rotation.to_appender())
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)
        .with_context(|| format!("Cannot open log directory {}", config.log_dir))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(&config.log_level))
            .with_context(|| format!("Invalid log_level {:?}", config.log_level))?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // job, day and count fields stay queryable
        let file_layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry
            .with(file_layer)
            .try_init()
            .context("Logger already installed")?;
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).compact();
        registry
            .with(file_layer)
            .with(stdout_layer)
            .try_init()
            .context("Logger already installed")?;
    }

    Ok(guard)
}

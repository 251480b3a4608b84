//! # Logger Module
//!
//! Diagnostic logging through `tracing-subscriber`. Progress output for the user is rendered
//! separately by the display module; everything logged here is for operators.
//!
//! ## Configuration
//!
//! - `DEPLOYER_LOGGER__LEVEL`: DEBUG, INFO, WARN or ERROR (default INFO)
//! - `DEPLOYER_LOGGER__FORMAT`: Text or Json (default Text)
//! - `DEPLOYER_LOGGER__STDOUT`: log to stdout instead of the daily file in `~/.deployer`
//! - `RUST_LOG`: standard filter directives, overriding the configured level
//!
//! ```bash
//! RUST_LOG=deployer_cli::infrastructure=debug deployer-cli update --target "Tenant - Contoso" ...
//! ```
//!
//! Text lines look like `[2024-05-01T10:00:00Z INFO - deployer_cli::framework::jobs] Running ...`,
//! JSON lines carry `timestamp`, `severity`, `target` and `message`.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Daily log files are named `cli.log.YYYY-MM-DD`
pub const LOG_FILE_PREFIX: &str = "cli.log";

const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerLevel {
    #[serde(alias = "DEBUG", alias = "debug")]
    Debug,
    #[serde(alias = "INFO", alias = "info")]
    Info,
    #[serde(alias = "WARN", alias = "warn")]
    Warn,
    #[serde(alias = "ERROR", alias = "error")]
    Error,
}

impl LoggerLevel {
    pub fn to_tracing_level(self) -> LevelFilter {
        match self {
            LoggerLevel::Debug => LevelFilter::DEBUG,
            LoggerLevel::Info => LevelFilter::INFO,
            LoggerLevel::Warn => LevelFilter::WARN,
            LoggerLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    #[serde(alias = "json", alias = "JSON")]
    Json,
    #[serde(alias = "text", alias = "TEXT")]
    Text,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoggerSettings {
    #[serde(default = "default_log_level")]
    pub level: LoggerLevel,
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> LoggerLevel {
    LoggerLevel::Info
}

fn default_log_stdout() -> bool {
    false
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggerSettings {
    fn default() -> Self {
        LoggerSettings {
            level: default_log_level(),
            stdout: default_log_stdout(),
            format: default_log_format(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("A global logger is already installed")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Deletes log files in `log_dir` older than a week. Failures only warn.
fn clean_old_logs(log_dir: &Path) {
    let Some(cut_off) = SystemTime::now().checked_sub(LOG_RETENTION) else {
        return;
    };

    let Ok(dir) = log_dir.read_dir() else {
        warn!("Failed to read log directory {}", log_dir.display());
        return;
    };

    for entry in dir.flatten() {
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        match entry.metadata().and_then(|md| md.modified()) {
            Ok(modified) if modified < cut_off => {
                let _ = std::fs::remove_file(entry.path());
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Failed to read modification time for {:?}. {}",
                entry.path(),
                e
            ),
        }
    }
}

/// One line per event, text or JSON
struct LineFormatLayer<W> {
    writer: W,
    format: LogFormat,
}

impl<W> LineFormatLayer<W> {
    fn format_text(&self, level: &Level, target: &str, message: &str) -> String {
        format!(
            "[{} {} - {}] {}",
            humantime::format_rfc3339_seconds(SystemTime::now()),
            level,
            target,
            message
        )
    }

    fn format_json(&self, level: &Level, target: &str, message: &str) -> String {
        serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "severity": level.to_string(),
            "target": target,
            "message": message,
        })
        .to_string()
    }
}

impl<S, W> Layer<S> for LineFormatLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let output = match self.format {
            LogFormat::Text => self.format_text(metadata.level(), metadata.target(), &visitor.line()),
            LogFormat::Json => self.format_json(metadata.level(), metadata.target(), &visitor.line()),
        };

        let mut writer = self.writer.make_writer();
        let _ = writer.write_all(output.as_bytes());
        let _ = writer.write_all(b"\n");
    }
}

/// Collects the message and appends structured fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn line(&self) -> String {
        if self.fields.is_empty() {
            self.message.clone()
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// Installs the global subscriber.
///
/// # Arguments
/// * `settings` - Level, format and destination
/// * `log_dir` - Where daily log files go when not logging to stdout
pub fn setup_logging(settings: &LoggerSettings, log_dir: &Path) -> Result<(), LoggerError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_tracing_level().to_string()));

    if settings.stdout {
        let layer = LineFormatLayer {
            writer: std::io::stdout,
            format: settings.format,
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()?;
    } else {
        clean_old_logs(log_dir);
        let layer = LineFormatLayer {
            writer: tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX),
            format: settings.format,
        };
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()?;
    }

    Ok(())
}

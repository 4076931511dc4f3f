//! Logging configuration and initialization
//!
//! All binaries in the workspace log through `tracing`. This module owns the
//! subscriber setup so that every entry point gets the same behavior:
//!
//! - text or JSON formatting
//! - stdout by default, or a single log file when one is configured
//! - level taken from config, refined by `RUST_LOG`/extra filter directives
//!
//! Use structured fields rather than formatted strings where a value is
//! worth filtering on:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! # let path = "logs/a.tsv.gz";
//! info!(file = %path, lines = 42, "File streamed");
//! warn!(file = %path, "High error rate");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use memc_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Loader started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Default file name prefix for rolling logs
pub const DEFAULT_LOG_FILE_PREFIX: &str = "memc-load";

/// Logging configuration
///
/// Output goes to `file` when set, otherwise to a daily rolling file in
/// `log_dir` when set, otherwise to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,

    pub format: LogFormat,

    /// Write to this file instead of stdout
    pub file: Option<PathBuf>,

    /// Directory for daily rolling log files
    pub log_dir: Option<PathBuf>,

    /// Rolling file name prefix (e.g. "memc-load" -> "memc-load.2024-01-18")
    pub log_file_prefix: String,

    /// Additional filter directives (e.g. "memc_load::workers=debug")
    pub filter_directives: Option<String>,

    /// Whether to include thread names in logs (useful for worker pools)
    pub include_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            file: None,
            log_dir: None,
            log_file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            filter_directives: None,
            include_thread_names: false,
        }
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    ///
    /// - `LOG_LEVEL`: trace, debug, info, warn, error
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_FILE`: path of a single log file
    /// - `LOG_DIR`: directory for daily rolling log files
    /// - `LOG_FILE_PREFIX`: rolling file name prefix
    /// - `LOG_FILTER`: additional filter directives
    /// - `LOG_INCLUDE_THREAD_NAMES`: true/false
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level.parse()?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }

        if let Ok(file) = std::env::var("LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }

        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            config.log_file_prefix = prefix;
        }

        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_THREAD_NAMES") {
            config.include_thread_names = val.parse().unwrap_or(false);
        }

        Ok(config)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn writes_to_terminal(&self) -> bool {
        self.file.is_none() && self.log_dir.is_none()
    }

    /// Pick the output: single file, rolling directory, or stdout
    fn make_writer(&self) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
        if let Some(ref path) = self.file {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            return Ok((BoxMakeWriter::new(writer), Some(guard)));
        }

        if let Some(ref dir) = self.log_dir {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, &self.log_file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            return Ok((BoxMakeWriter::new(writer), Some(guard)));
        }

        Ok((BoxMakeWriter::new(std::io::stdout), None))
    }

    /// Build the level filter, layering extra directives on top
    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(self.level.to_tracing_level().into());

        if let Some(ref directives) = self.filter_directives {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                filter = filter.add_directive(
                    directive
                        .trim()
                        .parse()
                        .context("Failed to parse filter directive")?,
                );
            }
        }

        Ok(filter)
    }
}

/// Initialize the global tracing subscriber
///
/// Returns the file writer guard when logging to a file or directory; keep it alive until
/// the process exits or buffered lines are lost.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let (writer, guard) = config.make_writer()?;

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_thread_names(config.include_thread_names)
        .with_ansi(config.writes_to_terminal());

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        },
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.json())
                .try_init()?;
        },
    }

    Ok(guard)
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

//! Logging setup for droidbar
//!
//! Installs a `tracing` subscriber with:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - compact output on stderr, so it never mixes with command output on stdout
//! - an optional daily rolling log file, plain text or JSON lines

#![warn(missing_docs)]

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// File name prefix for rolling log files
pub const LOG_FILE_PREFIX: &str = "droidbar.log";

/// Global session ID for correlating logs
static SESSION_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Get the current session ID
pub fn session_id() -> &'static str {
    &SESSION_ID
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Directory for the daily rolling log file
    pub log_dir: Option<PathBuf>,
    /// Write the log file as JSON lines
    pub json: bool,
    /// Include the event target on stderr lines
    pub show_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
            json: false,
            show_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Adjust the level for `-v` counts and `--quiet`
    pub fn with_verbosity(mut self, verbose: u8, quiet: bool) -> Self {
        self.log_level = match (quiet, verbose) {
            (true, _) => "error".to_string(),
            (false, 0) => self.log_level,
            (false, 1) => "info".to_string(),
            (false, 2) => "debug".to_string(),
            (false, _) => "trace".to_string(),
        };
        self.show_target = verbose >= 2;
        self
    }
}

/// Keeps the background log-file writer alive; drop it last
#[must_use = "dropping the guard stops file logging"]
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize with default configuration
pub fn init() -> anyhow::Result<TelemetryGuard> {
    init_with_config(TelemetryConfig::default())
}

/// Initialize with custom configuration
pub fn init_with_config(config: TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .compact();

    let (plain_file, json_file, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow::anyhow!("Failed to create log directory {}: {}", dir.display(), e))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.json {
                (None, Some(fmt::layer().json().with_writer(writer)), Some(guard))
            } else {
                (Some(fmt::layer().with_ansi(false).with_writer(writer)), None, Some(guard))
            }
        }
        None => (None, None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(plain_file)
        .with(json_file);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    tracing::info!(
        session_id = %session_id(),
        version = env!("CARGO_PKG_VERSION"),
        log_dir = ?config.log_dir,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { _file: guard })
}

//! Configuration schema definitions
//!
//! Every field has a default, so an empty file (or no file) is valid.

use crate::process::default_shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub adb: AdbConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How commands are run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneralConfig {
    /// Shell interpreter for command lines (platform default when unset)
    #[serde(default)]
    pub shell: Option<String>,

    /// Kill commands after this many seconds; 0 disables the limit
    #[serde(default)]
    pub timeout_secs: u64,
}

impl GeneralConfig {
    /// The shell to run commands with
    pub fn shell_path(&self) -> PathBuf {
        self.shell
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(default_shell)
    }

    /// The command time limit, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// The Android project commands run against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root containing `gradlew`
    #[serde(default = "default_project_path")]
    pub path: String,

    /// Application id used by `am start`; never read from build files
    #[serde(default)]
    pub package: Option<String>,

    /// Activity to launch, relative to the package when it starts with `.`
    #[serde(default = "default_activity")]
    pub activity: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            package: None,
            activity: default_activity(),
        }
    }
}

impl ProjectConfig {
    /// Project root with `~` and variables expanded
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

fn default_project_path() -> String {
    ".".to_string()
}

fn default_activity() -> String {
    ".MainActivity".to_string()
}

/// adb invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbConfig {
    /// adb executable, looked up in PATH when it has no directory part
    #[serde(default = "default_adb_path")]
    pub path: String,

    /// Device serial passed as `-s`
    #[serde(default)]
    pub serial: Option<String>,

    /// Extra arguments appended to `adb logcat`
    #[serde(default)]
    pub logcat_args: Vec<String>,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: default_adb_path(),
            serial: None,
            logcat_args: Vec::new(),
        }
    }
}

impl AdbConfig {
    /// adb executable with `~` and variables expanded
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

/// Logging output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Write the log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Log directory with `~` and variables expanded
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand_path)
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Expand `~` and environment variables, leaving the input as-is on failure
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

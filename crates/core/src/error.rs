//! Structured errors with codes, context and recovery suggestions
//!
//! Every failure the runner, watcher or configuration layer can produce is an
//! [`Error`] carrying:
//! - an [`ErrorCode`] for programmatic handling
//! - optional context and a recovery suggestion for the log sink
//! - a serialisable [`ErrorReport`] for `--json` output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General errors (1xxx)
    Unknown = 1000,
    Internal = 1001,

    // IO errors (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,
    InvalidPath = 2003,
    DirectoryNotFound = 2004,

    // Configuration errors (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,
    ConfigParseError = 3002,
    InvalidConfigValue = 3003,

    // Process errors (4xxx)
    ProcessError = 4000,
    CommandNotFound = 4001,
    SpawnFailed = 4002,
    ProcessTimeout = 4003,
    Cancelled = 4004,

    // Android errors (5xxx)
    AndroidError = 5000,
    ProjectNotFound = 5001,
    GradleWrapperMissing = 5002,
    PackageNotConfigured = 5003,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            1 => "General",
            2 => "IO",
            3 => "Configuration",
            4 => "Process",
            5 => "Android",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Main error type with rich context
#[derive(Error, Debug)]
pub struct Error {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional context
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  Context: {}", ctx)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a recovery suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// True when the child process could not be created at all
    pub fn is_spawn_error(&self) -> bool {
        matches!(self.code, ErrorCode::SpawnFailed | ErrorCode::CommandNotFound)
    }

    /// Convert to a serializable report
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code,
            code_str: self.code.to_string(),
            category: self.code.category().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            suggestion: self.suggestion.clone(),
            source: self.source.as_ref().map(|e| e.to_string()),
        }
    }

    // Convenience constructors

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IoError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn directory_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::DirectoryNotFound,
            format!("Directory not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Check the project path in your droidbar configuration")
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    pub fn config_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create a .droidbar.toml file or use --config to specify a path")
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessError, message)
    }

    pub fn spawn(program: &str, err: std::io::Error) -> Self {
        let suggestion = match err.kind() {
            std::io::ErrorKind::NotFound => "Check that the executable and working directory exist",
            std::io::ErrorKind::PermissionDenied => "Check the executable's permissions",
            _ => "Check the command and try again",
        };
        Self::new(
            ErrorCode::SpawnFailed,
            format!("Failed to launch {}: {}", program, err),
        )
        .with_suggestion(suggestion)
        .with_source(err)
    }

    pub fn command_not_found(cmd: &str) -> Self {
        Self::new(
            ErrorCode::CommandNotFound,
            format!("Command not found: {}", cmd),
        )
        .with_suggestion(format!("Install {} and ensure it's in your PATH", cmd))
    }

    pub fn timeout(command: &str, limit: Duration) -> Self {
        let limit = if limit.subsec_millis() == 0 {
            format!("{}s", limit.as_secs())
        } else {
            format!("{}ms", limit.as_millis())
        };
        Self::new(
            ErrorCode::ProcessTimeout,
            format!("Command timed out after {}: {}", limit, command),
        )
        .with_suggestion("Raise general.timeout_secs or pass --timeout 0 to disable the limit")
    }

    pub fn cancelled(command: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("Command cancelled: {}", command))
    }

    pub fn android(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AndroidError, message)
    }

    pub fn package_not_configured() -> Self {
        Self::new(
            ErrorCode::PackageNotConfigured,
            "No application package configured",
        )
        .with_suggestion("Set project.package in .droidbar.toml or pass --package")
    }
}

/// Serializable error report for logging and `--json` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code
    pub code: ErrorCode,
    /// Code as shown to users, e.g. `E4002`
    pub code_str: String,
    /// Category of the code
    pub category: String,
    /// Human-readable message
    pub message: String,
    /// Where the error happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// How to recover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Underlying error, rendered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for CLI commands
pub mod exit_codes {
    /// Everything worked
    pub const SUCCESS: i32 = 0;
    /// Generic failure
    pub const FAILURE: i32 = 1;
    /// Configuration could not be loaded
    pub const CONFIG_ERROR: i32 = 3;
    /// Stopped by the user
    pub const CANCELLED: i32 = 130;
    /// Killed after the time limit, as `timeout(1)` reports it
    pub const TIMEOUT: i32 = 124;
    /// Executable or shell could not be started
    pub const COMMAND_NOT_FOUND: i32 = 127;

    /// Map an error to the exit code a binary should return
    pub fn for_error(err: &super::Error) -> i32 {
        use super::ErrorCode;
        match err.code {
            ErrorCode::ProcessTimeout => TIMEOUT,
            ErrorCode::Cancelled => CANCELLED,
            ErrorCode::CommandNotFound | ErrorCode::SpawnFailed => COMMAND_NOT_FOUND,
            code if code.category() == "Configuration" => CONFIG_ERROR,
            _ => FAILURE,
        }
    }
}

// Implement From for common error types

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::Internal, format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {}", err))
            .with_source(err)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_suggestion(suggestion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::SpawnFailed.to_string(), "E4002");
        assert_eq!(ErrorCode::ConfigError.to_string(), "E3000");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::IoError.category(), "IO");
        assert_eq!(ErrorCode::ProcessTimeout.category(), "Process");
        assert_eq!(ErrorCode::PackageNotConfigured.category(), "Android");
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::spawn("/bin/zsh", io);

        assert!(err.is_spawn_error());
        assert!(err.source.is_some());
        assert!(err.message.contains("/bin/zsh"));
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            exit_codes::for_error(&Error::timeout("sleep 5", Duration::from_secs(1))),
            exit_codes::TIMEOUT
        );
        assert_eq!(exit_codes::for_error(&Error::cancelled("sleep 5")), exit_codes::CANCELLED);
        assert_eq!(exit_codes::for_error(&Error::config("bad")), exit_codes::CONFIG_ERROR);
        assert_eq!(exit_codes::for_error(&Error::android("adb")), exit_codes::FAILURE);
    }

    #[test]
    fn test_timeout_message_keeps_subsecond_limit() {
        let err = Error::timeout("sleep 5", Duration::from_millis(250));
        assert!(err.message.contains("after 250ms"));

        let err = Error::timeout("sleep 5", Duration::from_secs(30));
        assert!(err.message.contains("after 30s"));
    }

    #[test]
    fn test_error_report_serialization() {
        let err = Error::package_not_configured().with_context("While launching the app");

        let report = err.to_report();
        let json = serde_json::to_string(&report).unwrap();

        assert!(json.contains("E5003"));
        assert!(json.contains("Android"));
        assert!(json.contains("While launching"));
    }
}

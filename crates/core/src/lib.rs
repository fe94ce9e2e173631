//! Core utilities for droidbar
//!
//! This crate provides the process plumbing behind every droidbar command:
//!
//! - **Command runner**: run a shell command line in a directory and capture
//!   its combined output, with optional time limit and background cancellation
//! - **Log watcher**: stream the output of a long-running process chunk by
//!   chunk until it exits or is cancelled
//! - **Error handling**: errors with codes, context, and recovery suggestions
//! - **Configuration**: TOML-based configuration with defaults
//! - **Health checks**: verify the shell, adb and the Gradle wrapper
//!
//! # Example
//!
//! ```rust,no_run
//! use droidbar_core::process::CommandRunner;
//! use std::path::Path;
//!
//! let output = CommandRunner::new()
//!     .run("./gradlew assembleDebug", Path::new("."))
//!     .expect("shell could not be started");
//!
//! print!("{}", output.log_text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod decode;
pub mod error;
pub mod health;
pub mod process;
pub mod watch;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigSchema};
    pub use crate::error::{exit_codes, Error, ErrorCode, Result, ResultExt};
    pub use crate::health::{HealthChecker, HealthReport, HealthStatus};
    pub use crate::process::{CapturedOutput, CommandRunner, RunWarning, RunningCommand, Termination};
    pub use crate::watch::{LogWatcher, WatchCanceller, WatchEvent, WatchHandle, WatchSink, WatchStatus};
}

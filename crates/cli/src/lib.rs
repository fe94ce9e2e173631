//! CLI utilities for droidbar
//!
//! Provides the terminal side of the tool:
//! - a log pane that renders command output, warnings and failures
//! - spinners while a blocking command runs

#![warn(missing_docs)]

pub mod output;
pub mod progress;

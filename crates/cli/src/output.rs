//! Terminal log pane
//!
//! Everything a command produces ends up here as text: its output, one line
//! per warning, and a readable line for every failure.

use droidbar_core::error::Error;
use droidbar_core::process::{CapturedOutput, RunWarning};
use owo_colors::OwoColorize;
use std::io::Write;

/// Severity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Neutral progress information
    Info,
    /// Something finished well
    Success,
    /// Worth attention, not fatal
    Warning,
    /// Something failed
    Error,
}

impl Level {
    fn glyph(self) -> &'static str {
        match self {
            Level::Info => "ℹ",
            Level::Success => "✓",
            Level::Warning => "⚠",
            Level::Error => "✗",
        }
    }
}

/// Log pane writing to the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPane {
    quiet: bool,
    timestamps: bool,
}

impl LogPane {
    /// Create a pane; `quiet` hides info and success lines
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            timestamps: false,
        }
    }

    /// Prefix status lines with the local time
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    fn timestamp(&self) -> Option<String> {
        self.timestamps
            .then(|| chrono::Local::now().format("%H:%M:%S").to_string())
    }

    fn line(&self, level: Level, message: &str) {
        if self.quiet && matches!(level, Level::Info | Level::Success) {
            return;
        }
        let ts = self.timestamp();
        let glyph = level.glyph();
        let prefix = match &ts {
            Some(ts) => format!("[{}] ", ts).dimmed().to_string(),
            None => String::new(),
        };
        match level {
            Level::Info => println!("{}{} {}", prefix, glyph.blue(), message),
            Level::Success => println!("{}{} {}", prefix, glyph.green(), message),
            Level::Warning => eprintln!("{}{} {}", prefix, glyph.yellow(), message),
            Level::Error => eprintln!("{}{} {}", prefix, glyph.red(), message),
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.line(Level::Info, message);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.line(Level::Success, message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        self.line(Level::Warning, message);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        self.line(Level::Error, message);
    }

    /// Echo the command line about to run
    pub fn command(&self, command: &str) {
        if !self.quiet {
            println!("{} {}", "$".dimmed(), command.bold());
        }
    }

    /// Print a finished command's output followed by its warnings
    pub fn captured(&self, output: &CapturedOutput) {
        if !output.text.is_empty() {
            print!("{}", output.text);
            if !output.text.ends_with('\n') {
                println!();
            }
        }
        for warning in &output.warnings {
            match warning {
                RunWarning::InvalidUtf8 { .. } => self.warning(&warning.to_string()),
                _ => self.error(&warning.to_string()),
            }
        }
    }

    /// Print a streamed chunk exactly as received
    pub fn chunk(&self, chunk: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }

    /// Print an error with its context and suggestion
    pub fn failure(&self, err: &Error) {
        self.error(&format!("[{}] {}", err.code, err.message));
        if let Some(context) = &err.context {
            eprintln!("  {} {}", "context:".dimmed(), context);
        }
        if let Some(suggestion) = &err.suggestion {
            eprintln!("  {} {}", "hint:".cyan(), suggestion);
        }
    }

    /// Print a header
    pub fn header(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("{}", message.bold());
        println!("{}", "─".repeat(message.chars().count()));
    }
}

/// Format a duration for display
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f32();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining_secs)
    }
}

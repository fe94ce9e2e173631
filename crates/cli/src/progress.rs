//! Progress indicators
//!
//! A spinner runs on stderr while a blocking command holds the terminal.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while `command` runs; hidden when `quiet`
pub fn command_spinner(command: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(command.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Remove the spinner so command output can take its place
pub fn finish(pb: &ProgressBar) {
    pb.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_creation() {
        let pb = command_spinner("./gradlew assembleDebug", false);
        finish(&pb);
        assert!(pb.is_finished());
    }

    #[test]
    fn test_quiet_spinner_is_hidden() {
        let pb = command_spinner("./gradlew assembleDebug", true);
        assert!(pb.is_hidden());
        finish(&pb);
    }
}

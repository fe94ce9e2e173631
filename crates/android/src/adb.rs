//! adb command forwarding
//!
//! Launching the app goes through the command runner as a plain command
//! line; logcat is a long-running watch session.

use droidbar_core::config::AdbConfig;
use droidbar_core::error::{Error, Result};
use droidbar_core::process::{shell_quote, CapturedOutput, CommandRunner};
use droidbar_core::watch::LogWatcher;
use std::path::{Path, PathBuf};

/// adb executable plus the device it talks to
#[derive(Debug, Clone)]
pub struct Adb {
    path: PathBuf,
    serial: Option<String>,
    logcat_args: Vec<String>,
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl Adb {
    /// adb at `path`, talking to the only connected device
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            serial: None,
            logcat_args: Vec::new(),
        }
    }

    /// adb as described by the `[adb]` config section
    pub fn from_config(config: &AdbConfig) -> Self {
        Self {
            path: config.path(),
            serial: config.serial.clone(),
            logcat_args: config.logcat_args.clone(),
        }
    }

    /// Target a specific device serial
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// The adb executable
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn device_args(&self) -> Vec<String> {
        match &self.serial {
            Some(serial) => vec!["-s".to_string(), serial.clone()],
            None => Vec::new(),
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.path.display().to_string())
            .chain(self.device_args())
            .chain(args.iter().cloned())
            .map(|word| shell_quote(&word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Command line that starts `package/activity` on the device
    pub fn launch_command(&self, package: &str, activity: &str) -> Result<String> {
        let package = package.trim();
        if package.is_empty() {
            return Err(Error::package_not_configured());
        }
        let component = format!("{}/{}", package, activity.trim());
        let args = ["shell", "am", "start", "-n", component.as_str()].map(String::from);
        Ok(self.command_line(&args))
    }

    /// Start the app's activity
    ///
    /// `am start` reports a missing activity on stdout with exit status 0, so
    /// callers should show the output rather than trust the status alone.
    pub fn launch(
        &self,
        runner: &CommandRunner,
        dir: &Path,
        package: &str,
        activity: &str,
    ) -> Result<CapturedOutput> {
        let command = self.launch_command(package, activity)?;
        tracing::info!(package, activity, "launching app");
        runner.run(&command, dir)
    }

    /// Command line that clears the logcat buffer
    pub fn clear_logcat_command(&self) -> String {
        self.command_line(&["logcat".to_string(), "-c".to_string()])
    }

    /// Clear the device log buffer
    pub fn clear_logcat(&self, runner: &CommandRunner, dir: &Path) -> Result<CapturedOutput> {
        runner.run(&self.clear_logcat_command(), dir)
    }

    /// Arguments for `adb logcat`, configured ones first
    pub fn logcat_args(&self, extra: &[String]) -> Vec<String> {
        let mut args = self.device_args();
        args.push("logcat".to_string());
        args.extend(self.logcat_args.iter().cloned());
        args.extend(extra.iter().cloned());
        args
    }

    /// Watcher for `adb logcat`; nothing runs until it is started
    pub fn logcat(&self, extra: &[String]) -> LogWatcher {
        LogWatcher::new(&self.path).args(self.logcat_args(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droidbar_core::error::ErrorCode;

    #[test]
    fn test_launch_command() {
        let adb = Adb::default();
        assert_eq!(
            adb.launch_command("com.example.app", ".MainActivity").unwrap(),
            "adb shell am start -n com.example.app/.MainActivity"
        );
    }

    #[test]
    fn test_launch_command_with_serial_and_spaces() {
        let adb = Adb::new("/opt/Android Sdk/platform-tools/adb").with_serial("emulator-5554");
        assert_eq!(
            adb.launch_command("com.example.app", ".ui.MainActivity").unwrap(),
            "'/opt/Android Sdk/platform-tools/adb' -s emulator-5554 shell am start -n com.example.app/.ui.MainActivity"
        );
    }

    #[test]
    fn test_launch_without_package() {
        let err = Adb::default().launch_command("  ", ".MainActivity").unwrap_err();
        assert_eq!(err.code, ErrorCode::PackageNotConfigured);
    }

    #[test]
    fn test_logcat_args() {
        let config = AdbConfig {
            path: "adb".to_string(),
            serial: Some("R58M123".to_string()),
            logcat_args: vec!["-v".to_string(), "time".to_string()],
        };
        let adb = Adb::from_config(&config);

        assert_eq!(
            adb.logcat_args(&["*:E".to_string()]),
            vec!["-s", "R58M123", "logcat", "-v", "time", "*:E"]
        );
        assert_eq!(adb.clear_logcat_command(), "adb -s R58M123 logcat -c");
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_runs_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let fake = crate::testing::script(dir.path(), "adb", "echo \"$@\"");
        let runner = CommandRunner::new().with_shell("/bin/sh");

        let out = Adb::new(fake)
            .launch(&runner, dir.path(), "com.example.app", ".MainActivity")
            .unwrap();
        assert_eq!(out.text, "shell am start -n com.example.app/.MainActivity\n");
    }
}

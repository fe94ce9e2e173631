//! Health checks for the tools droidbar forwards commands to
//!
//! Verifies:
//! - the shell used by the command runner
//! - `adb` on PATH (or at its configured location)
//! - the Android SDK environment variables
//! - the Gradle wrapper in the project directory

use crate::process::command_exists;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All checks passed
    Healthy,
    /// Some optional checks failed
    Degraded,
    /// Required checks failed
    Unhealthy,
}

impl HealthStatus {
    /// Returns true if status is healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns true if status is healthy or degraded (still operational)
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Individual health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Status of the check
    pub status: HealthStatus,
    /// Optional message with details
    pub message: Option<String>,
    /// Duration of the check in milliseconds
    pub duration_ms: u64,
    /// Additional details as key-value pairs
    pub details: BTreeMap<String, String>,
}

impl CheckResult {
    fn with_status(name: impl Into<String>, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message,
            duration_ms: 0,
            details: BTreeMap::new(),
        }
    }

    /// Create a healthy check result
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Healthy, None)
    }

    /// Create an unhealthy check result with a message
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Unhealthy, Some(message.into()))
    }

    /// Create a degraded check result with a message
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Degraded, Some(message.into()))
    }

    /// Add a detail key-value pair
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Overall health report containing all check results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status based on all checks
    pub status: HealthStatus,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Total duration of all checks in milliseconds
    pub total_duration_ms: u64,
    /// Timestamp when the report was generated
    pub timestamp: String,
    /// Version of the tool
    pub version: String,
}

impl HealthReport {
    /// Create a new health report from check results
    #[must_use]
    pub fn new(checks: Vec<CheckResult>, duration: Duration) -> Self {
        let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            checks,
            total_duration_ms: duration.as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Returns true if overall status is healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Get all checks that failed (not healthy)
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| !c.status.is_healthy())
            .collect()
    }
}

/// Health checker with configurable checks
#[derive(Default)]
pub struct HealthChecker {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthChecker {
    /// Create a new health checker with no checks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a health check
    #[must_use]
    pub fn add_check(mut self, check: impl HealthCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Checks for running gradle and adb against `project_dir`
    #[must_use]
    pub fn with_android_checks(self, shell: &Path, adb: &Path, project_dir: &Path) -> Self {
        self.add_check(ExecutableCheck::new("shell", shell))
            .add_check(ExecutableCheck::new("adb", adb))
            .add_check(EnvVarCheck::any_of(&["ANDROID_HOME", "ANDROID_SDK_ROOT"]))
            .add_check(GradleWrapperCheck::new(project_dir))
    }

    /// Run all health checks
    #[must_use]
    pub fn run(&self) -> HealthReport {
        let start = Instant::now();
        let results = self
            .checks
            .iter()
            .map(|check| {
                let check_start = Instant::now();
                let mut result = check.check();
                result.duration_ms = check_start.elapsed().as_millis() as u64;
                result
            })
            .collect();

        HealthReport::new(results, start.elapsed())
    }
}

/// Trait for implementing health checks
pub trait HealthCheck: Send + Sync {
    /// Perform the health check and return a result
    fn check(&self) -> CheckResult;
}

/// An executable given by path or by bare name on PATH
pub struct ExecutableCheck {
    name: String,
    program: PathBuf,
}

impl ExecutableCheck {
    /// Check that `program` can be executed
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }
}

impl HealthCheck for ExecutableCheck {
    fn check(&self) -> CheckResult {
        let display = self.program.display().to_string();
        let bare = self.program.components().count() == 1 && !self.program.is_absolute();

        let found = if bare {
            command_exists(&display)
        } else {
            self.program.is_file()
        };

        if found {
            CheckResult::healthy(&self.name).with_detail("path", display)
        } else {
            CheckResult::unhealthy(&self.name, format!("{} not found", display))
        }
    }
}

/// Check that at least one of several environment variables is set
pub struct EnvVarCheck {
    vars: Vec<String>,
}

impl EnvVarCheck {
    /// Degraded unless one of `vars` is set
    pub fn any_of(vars: &[&str]) -> Self {
        Self {
            vars: vars.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl HealthCheck for EnvVarCheck {
    fn check(&self) -> CheckResult {
        let name = self.vars.join("|");
        for var in &self.vars {
            if let Ok(value) = std::env::var(var) {
                return CheckResult::healthy(name).with_detail(var.clone(), value);
            }
        }
        CheckResult::degraded(name, format!("none of {} is set (optional)", self.vars.join(", ")))
    }
}

/// Check that a project directory has a Gradle wrapper
pub struct GradleWrapperCheck {
    project_dir: PathBuf,
}

impl GradleWrapperCheck {
    /// Check `project_dir` for `gradlew`
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }
}

impl HealthCheck for GradleWrapperCheck {
    fn check(&self) -> CheckResult {
        let dir = self.project_dir.display().to_string();
        if !self.project_dir.is_dir() {
            return CheckResult::unhealthy("gradlew", format!("project directory {} does not exist", dir));
        }

        let wrapper = self.project_dir.join(if cfg!(windows) { "gradlew.bat" } else { "gradlew" });
        if wrapper.is_file() {
            CheckResult::healthy("gradlew").with_detail("path", wrapper.display().to_string())
        } else {
            CheckResult::unhealthy("gradlew", format!("no Gradle wrapper in {}", dir))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_check_bare_name() {
        #[cfg(unix)]
        assert!(ExecutableCheck::new("shell", "sh").check().status.is_healthy());

        let result = ExecutableCheck::new("adb", "nonexistent_command_12345").check();
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_executable_check_path() {
        let result = ExecutableCheck::new("adb", "/nonexistent/platform-tools/adb").check();
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_gradle_wrapper_check() {
        let dir = tempfile::tempdir().unwrap();
        let check = GradleWrapperCheck::new(dir.path());
        assert_eq!(check.check().status, HealthStatus::Unhealthy);

        let name = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };
        std::fs::write(dir.path().join(name), "#!/bin/sh\n").unwrap();
        assert!(check.check().status.is_healthy());
    }

    #[test]
    fn test_env_var_check_missing_is_degraded() {
        let result = EnvVarCheck::any_of(&["DROIDBAR_SURELY_UNSET_VAR"]).check();
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_health_report() {
        let checks = vec![CheckResult::healthy("check1"), CheckResult::healthy("check2")];
        let report = HealthReport::new(checks, Duration::from_millis(100));
        assert!(report.is_healthy());
    }

    #[test]
    fn test_health_report_with_failure() {
        let checks = vec![
            CheckResult::healthy("check1"),
            CheckResult::degraded("check2", "optional"),
            CheckResult::unhealthy("check3", "Failed"),
        ];
        let report = HealthReport::new(checks, Duration::from_millis(100));
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.failed_checks().len(), 2);
    }

    #[test]
    fn test_checker_runs_all_checks() {
        let dir = tempfile::tempdir().unwrap();
        let report = HealthChecker::new()
            .with_android_checks(Path::new("/nonexistent/sh"), Path::new("adb"), dir.path())
            .run();

        assert_eq!(report.checks.len(), 4);
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}

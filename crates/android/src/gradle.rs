//! Gradle build system integration
//!
//! Tasks run through the configured shell as `./gradlew <task>` in the
//! project root, the same command line a developer would type.

use crate::project::AndroidProject;
use droidbar_core::error::Result;
use droidbar_core::process::{shell_quote, CapturedOutput, CommandRunner, RunningCommand};

/// Gradle wrapper bound to one project
#[derive(Debug, Clone)]
pub struct Gradle {
    project: AndroidProject,
    runner: CommandRunner,
}

impl Gradle {
    /// Run tasks for `project` with `runner`
    pub fn new(project: AndroidProject, runner: CommandRunner) -> Self {
        Self { project, runner }
    }

    /// The project tasks run in
    pub fn project(&self) -> &AndroidProject {
        &self.project
    }

    /// Command line for a task
    pub fn task_command(&self, task: &str) -> String {
        format!("{} {}", self.project.wrapper_invocation(), shell_quote(task))
    }

    /// Run a Gradle task and wait for it
    pub fn run_task(&self, task: &str) -> Result<CapturedOutput> {
        tracing::info!(task, project = %self.project.root().display(), "running gradle task");
        self.runner.run(&self.task_command(task), self.project.root())
    }

    /// Run a Gradle task in the background
    pub fn spawn_task(&self, task: &str) -> Result<RunningCommand> {
        self.runner.spawn(&self.task_command(task), self.project.root())
    }

    /// Build debug APK
    pub fn assemble_debug(&self) -> Result<CapturedOutput> {
        self.run_task("assembleDebug")
    }

    /// Build and install the debug APK on the connected device
    pub fn install_debug(&self) -> Result<CapturedOutput> {
        self.run_task("installDebug")
    }

    /// Clean build artifacts
    pub fn clean(&self) -> Result<CapturedOutput> {
        self.run_task("clean")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::script;

    fn gradle_with_wrapper(body: &str) -> (tempfile::TempDir, Gradle) {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "gradlew", body);
        let project = AndroidProject::open(dir.path()).unwrap();
        let gradle = Gradle::new(project, CommandRunner::new().with_shell("/bin/sh"));
        (dir, gradle)
    }

    #[test]
    fn test_task_command() {
        let (_dir, gradle) = gradle_with_wrapper("exit 0");
        assert_eq!(gradle.task_command("assembleDebug"), "./gradlew assembleDebug");
    }

    #[test]
    fn test_assemble_debug_forwards_task() {
        let (_dir, gradle) = gradle_with_wrapper("echo \"task: $1\"");
        let out = gradle.assemble_debug().unwrap();

        assert!(out.success());
        assert_eq!(out.text, "task: assembleDebug\n");
    }

    #[test]
    fn test_failed_install_is_not_an_error() {
        let (_dir, gradle) = gradle_with_wrapper("echo 'No connected devices!' >&2; exit 1");
        let out = gradle.install_debug().unwrap();

        assert_eq!(out.exit_code, 1);
        assert!(out.log_text().contains("No connected devices!"));
        assert!(out.log_text().contains("Command failed with status: 1"));
    }

    #[test]
    fn test_spawn_task() {
        let (_dir, gradle) = gradle_with_wrapper("echo \"$1\"");
        let out = gradle.spawn_task("clean").unwrap().wait().unwrap();
        assert_eq!(out.text, "clean\n");
    }
}

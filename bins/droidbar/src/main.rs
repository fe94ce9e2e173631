//! droidbar
//!
//! Build, install, launch and tail logcat for an Android project from the
//! terminal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use droidbar_android::{Adb, AndroidProject, Gradle, LogTail};
use droidbar_cli::output::{format_duration, LogPane};
use droidbar_cli::progress;
use droidbar_core::config::Config;
use droidbar_core::error::exit_codes;
use droidbar_core::health::{HealthChecker, HealthStatus};
use droidbar_core::process::{CapturedOutput, CommandRunner, Termination};
use droidbar_core::watch::{WatchEvent, WatchStatus};
use droidbar_telemetry::TelemetryConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "droidbar")]
#[command(about = "Build, install, launch and tail logcat for an Android project")]
#[command(version)]
struct Cli {
    /// Android project directory
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Kill commands after this many seconds (0 disables the limit)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the debug APK
    Build {
        /// Clean before building
        #[arg(long)]
        clean: bool,
    },

    /// Install the debug APK on the device
    Install,

    /// Start the app's activity
    Launch {
        /// Application id (defaults to project.package)
        #[arg(long)]
        package: Option<String>,
        /// Activity to start (defaults to project.activity)
        #[arg(long)]
        activity: Option<String>,
    },

    /// Build, install and launch, stopping at the first failure
    Run,

    /// Stream the device log until Ctrl-C
    Logcat {
        /// Clear the log buffer first
        #[arg(long)]
        clear: bool,
        /// Extra logcat arguments, e.g. a filter spec
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a shell command in the project directory
    Exec {
        /// Command line, passed to the shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Diagnose environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    let pane = LogPane::new(cli.quiet).with_timestamps(cli.verbose > 0);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            pane.failure(&err);
            std::process::exit(exit_codes::for_error(&err));
        }
    };

    let logging = &config.schema.logging;
    let telemetry = TelemetryConfig {
        log_level: logging.level.clone(),
        log_dir: logging.log_dir(),
        json: logging.json,
        ..TelemetryConfig::default()
    }
    .with_verbosity(cli.verbose, cli.quiet);
    let guard = droidbar_telemetry::init_with_config(telemetry)?;

    let app = App::new(config, &cli, pane);
    let exit_code = match app.dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(code = %err.code, error = %err, "command failed");
            app.pane.failure(&err);
            exit_codes::for_error(&err)
        }
    };

    // `exit` skips destructors; flush the log file first.
    drop(guard);
    std::process::exit(exit_code);
}

struct App {
    config: Config,
    runner: CommandRunner,
    project_dir: PathBuf,
    pane: LogPane,
    quiet: bool,
}

impl App {
    fn new(config: Config, cli: &Cli, pane: LogPane) -> Self {
        let mut runner = CommandRunner::from_config(&config.schema.general);
        if let Some(secs) = cli.timeout {
            runner = runner.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        let project_dir = cli
            .project
            .clone()
            .unwrap_or_else(|| config.schema.project.path());

        Self {
            config,
            runner,
            project_dir,
            pane,
            quiet: cli.quiet,
        }
    }

    fn dispatch(&self, command: Commands) -> droidbar_core::Result<i32> {
        match command {
            Commands::Build { clean } => self.run_build(clean),
            Commands::Install => self.run_install(),
            Commands::Launch { package, activity } => {
                self.run_launch(package.as_deref(), activity.as_deref())
            }
            Commands::Run => self.run_all(),
            Commands::Logcat { clear, args } => self.run_logcat(clear, args),
            Commands::Exec { command } => self.run_exec(&command.join(" ")),
            Commands::Doctor { json } => self.run_doctor(json),
        }
    }

    fn adb(&self) -> Adb {
        Adb::from_config(&self.config.schema.adb)
    }

    fn gradle(&self) -> droidbar_core::Result<Gradle> {
        let project = AndroidProject::open(&self.project_dir)?;
        Ok(Gradle::new(project, self.runner.clone()))
    }

    /// Run one blocking step behind a spinner and print what it produced
    fn step(
        &self,
        command: &str,
        run: impl FnOnce() -> droidbar_core::Result<CapturedOutput>,
    ) -> droidbar_core::Result<CapturedOutput> {
        self.pane.command(command);
        let pb = progress::command_spinner(command, self.quiet);
        let result = run();
        progress::finish(&pb);

        let output = result?;
        self.pane.captured(&output);
        if output.success() {
            self.pane
                .success(&format!("Done in {}", format_duration(output.duration)));
        }
        Ok(output)
    }

    fn run_build(&self, clean: bool) -> droidbar_core::Result<i32> {
        let gradle = self.gradle()?;
        if clean {
            let output = self.step(&gradle.task_command("clean"), || gradle.clean())?;
            if !output.success() {
                return Ok(exit_status(&output));
            }
        }
        let output = self.step(&gradle.task_command("assembleDebug"), || {
            gradle.assemble_debug()
        })?;
        Ok(exit_status(&output))
    }

    fn run_install(&self) -> droidbar_core::Result<i32> {
        let gradle = self.gradle()?;
        let output = self.step(&gradle.task_command("installDebug"), || {
            gradle.install_debug()
        })?;
        Ok(exit_status(&output))
    }

    fn run_launch(
        &self,
        package: Option<&str>,
        activity: Option<&str>,
    ) -> droidbar_core::Result<i32> {
        let project = &self.config.schema.project;
        let package = package.or(project.package.as_deref()).unwrap_or_default();
        let activity = activity.unwrap_or(project.activity.as_str());

        let adb = self.adb();
        let command = adb.launch_command(package, activity)?;
        let output = self.step(&command, || {
            adb.launch(&self.runner, &self.project_dir, package, activity)
        })?;
        Ok(exit_status(&output))
    }

    fn run_all(&self) -> droidbar_core::Result<i32> {
        self.pane.header("Build");
        let code = self.run_build(false)?;
        if code != exit_codes::SUCCESS {
            return Ok(code);
        }

        self.pane.header("Install");
        let code = self.run_install()?;
        if code != exit_codes::SUCCESS {
            return Ok(code);
        }

        self.pane.header("Launch");
        self.run_launch(None, None)
    }

    fn run_logcat(&self, clear: bool, args: Vec<String>) -> droidbar_core::Result<i32> {
        let adb = self.adb();
        if clear {
            let output = self.step(&adb.clear_logcat_command(), || {
                adb.clear_logcat(&self.runner, &self.project_dir)
            })?;
            if !output.success() {
                return Ok(exit_status(&output));
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.stream_logcat(LogTail::new(adb).with_args(args)))
    }

    async fn stream_logcat(&self, mut tail: LogTail) -> droidbar_core::Result<i32> {
        let mut events = tail.start_channel()?;
        self.pane.info("Streaming logcat (Ctrl-C to stop)");

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(WatchEvent::Chunk(chunk)) => self.pane.chunk(&chunk),
                    Some(WatchEvent::Exit(status)) => return Ok(self.watch_finished(&status)),
                    None => return Ok(exit_codes::SUCCESS),
                },
                _ = &mut ctrl_c => {
                    tail.stop();
                    println!();
                    self.pane.info("logcat stopped");
                    return Ok(exit_codes::SUCCESS);
                }
            }
        }
    }

    fn watch_finished(&self, status: &WatchStatus) -> i32 {
        match status {
            WatchStatus::Exited(termination) if termination.success() => {
                self.pane.info("logcat exited");
                exit_codes::SUCCESS
            }
            WatchStatus::Exited(termination) => {
                self.pane.error(&format!("logcat {}", status));
                termination_code(termination)
            }
            WatchStatus::Cancelled => exit_codes::SUCCESS,
            WatchStatus::Failed(_) => {
                self.pane.error(&format!("logcat {}", status));
                exit_codes::FAILURE
            }
        }
    }

    fn run_exec(&self, command: &str) -> droidbar_core::Result<i32> {
        let output = self.step(command, || self.runner.run(command, &self.project_dir))?;
        Ok(exit_status(&output))
    }

    fn run_doctor(&self, json: bool) -> droidbar_core::Result<i32> {
        let report = HealthChecker::new()
            .with_android_checks(self.runner.shell(), self.adb().path(), &self.project_dir)
            .run();

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            self.pane.header("Environment");
            for check in &report.checks {
                let line = match &check.message {
                    Some(message) => format!("{}: {}", check.name, message),
                    None => check.name.clone(),
                };
                match check.status {
                    HealthStatus::Healthy => self.pane.success(&line),
                    HealthStatus::Degraded => self.pane.warning(&line),
                    HealthStatus::Unhealthy => self.pane.error(&line),
                }
            }
        }

        Ok(if report.status.is_operational() {
            exit_codes::SUCCESS
        } else {
            exit_codes::FAILURE
        })
    }
}

/// Exit code to hand back for a finished command
fn exit_status(output: &CapturedOutput) -> i32 {
    termination_code(&output.termination)
}

fn termination_code(termination: &Termination) -> i32 {
    match termination {
        Termination::Exited(code) => *code,
        Termination::Signaled(signal) => 128 + signal,
        Termination::Unknown => exit_codes::FAILURE,
    }
}

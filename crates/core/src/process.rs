//! Process execution utilities
//!
//! Runs a shell command line in a working directory and captures its output:
//! - stdout and stderr share one pipe, so the captured bytes keep write order
//! - output is returned as raw bytes plus a best-effort UTF-8 string
//! - a non-zero exit is a warning on the result, not an error
//! - an optional time limit kills a hung child
//! - [`CommandRunner::spawn`] runs in the background and can be cancelled

use crate::config::GeneralConfig;
use crate::decode::decode_complete;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::io::{PipeReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a waiting runner checks for exit, timeout and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to keep reading after the child exits, for output still in flight
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Termination {
    /// Exited normally with this code
    Exited(i32),
    /// Killed by this signal (unix only)
    Signaled(i32),
    /// The platform reported neither
    Unknown,
}

impl Termination {
    /// Exit code, or -1 when the process did not exit normally
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Exited(code) => *code,
            _ => -1,
        }
    }

    /// True for a clean exit with status 0
    pub fn success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Termination::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Termination::Signaled(signal);
            }
        }
        Termination::Unknown
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit status {}", code),
            Termination::Signaled(signal) => write!(f, "signal {}", signal),
            Termination::Unknown => write!(f, "unknown status"),
        }
    }
}

/// Soft problems attached to an otherwise successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunWarning {
    /// The child exited with a non-zero status
    NonZeroExit(i32),
    /// The child was killed by a signal it did not get from us
    Signaled(i32),
    /// Output was not valid UTF-8 from this byte offset on
    InvalidUtf8 {
        /// Length of the valid prefix
        valid_up_to: usize,
    },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::NonZeroExit(code) => write!(f, "Command failed with status: {}", code),
            RunWarning::Signaled(signal) => write!(f, "Command terminated by signal: {}", signal),
            RunWarning::InvalidUtf8 { valid_up_to } => write!(
                f,
                "Output is not valid UTF-8 after byte {}; invalid sequences were replaced",
                valid_up_to
            ),
        }
    }
}

/// Output of one finished command
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// The command line that was run
    pub command: String,
    /// Combined stdout and stderr, exactly as written
    pub bytes: Vec<u8>,
    /// `bytes` decoded as UTF-8, lossy if needed
    pub text: String,
    /// Exit code, -1 if the process did not exit normally
    pub exit_code: i32,
    /// How the process ended
    pub termination: Termination,
    /// Non-zero exit, signal or decoding problems
    pub warnings: Vec<RunWarning>,
    /// Wall time from spawn to exit
    pub duration: Duration,
}

impl CapturedOutput {
    fn new(command: &str, bytes: Vec<u8>, termination: Termination, duration: Duration) -> Self {
        let (text, invalid_at) = decode_complete(&bytes);

        let mut warnings = Vec::new();
        match termination {
            Termination::Exited(0) | Termination::Unknown => {}
            Termination::Exited(code) => warnings.push(RunWarning::NonZeroExit(code)),
            Termination::Signaled(signal) => warnings.push(RunWarning::Signaled(signal)),
        }
        if let Some(valid_up_to) = invalid_at {
            warnings.push(RunWarning::InvalidUtf8 { valid_up_to });
        }

        Self {
            command: command.to_string(),
            bytes,
            text,
            exit_code: termination.exit_code(),
            termination,
            warnings,
            duration,
        }
    }

    /// Whether the command succeeded (exit code 0)
    pub fn success(&self) -> bool {
        self.termination.success()
    }

    /// True if the output had to be decoded lossily
    pub fn decode_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, RunWarning::InvalidUtf8 { .. }))
    }

    /// Output followed by one diagnostic line per warning, for a log view
    pub fn log_text(&self) -> String {
        let mut out = self.text.clone();
        for warning in &self.warnings {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&warning.to_string());
            out.push('\n');
        }
        out
    }
}

/// Runs shell command lines and captures their combined output
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: PathBuf,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    /// Runner using the platform default shell and no time limit
    pub fn new() -> Self {
        Self {
            shell: default_shell(),
            timeout: None,
            env: Vec::new(),
        }
    }

    /// Runner configured from the `[general]` config section
    pub fn from_config(general: &GeneralConfig) -> Self {
        Self::new()
            .with_shell(general.shell_path())
            .with_timeout(general.timeout())
    }

    /// Use a specific shell interpreter
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for every command
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The shell commands are passed to
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// The configured time limit
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run a command line in `dir` and block until it finishes
    pub fn run(&self, command: &str, dir: &Path) -> Result<CapturedOutput> {
        let execution = self.start(command, dir)?;
        execution.finish(self.timeout, &AtomicBool::new(false))
    }

    /// Run a command line on a background thread
    pub fn spawn(&self, command: &str, dir: &Path) -> Result<RunningCommand> {
        let execution = self.start(command, dir)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let timeout = self.timeout;

        let thread = thread::Builder::new()
            .name("droidbar-run".to_string())
            .spawn(move || execution.finish(timeout, &flag))
            .map_err(|e| Error::internal(format!("Failed to start runner thread: {}", e)))?;

        Ok(RunningCommand {
            command: command.to_string(),
            cancel,
            thread,
        })
    }

    /// Run a command line without blocking the async runtime
    pub async fn run_async(&self, command: &str, dir: &Path) -> Result<CapturedOutput> {
        let runner = self.clone();
        let command = command.to_string();
        let dir = dir.to_path_buf();

        tokio::task::spawn_blocking(move || runner.run(&command, &dir))
            .await
            .map_err(|e| Error::internal(format!("Runner task failed: {}", e)))?
    }

    fn start(&self, command: &str, dir: &Path) -> Result<Execution> {
        if !dir.is_dir() {
            return Err(Error::spawn(
                command,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("working directory {} does not exist", dir.display()),
                ),
            ));
        }

        let mut cmd = Command::new(&self.shell);
        cmd.arg(shell_flag(&self.shell))
            .arg(command)
            .current_dir(dir)
            .stdin(Stdio::null());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        debug!(command, dir = %dir.display(), shell = %self.shell.display(), "spawning command");
        let program = self.shell.display().to_string();
        let (child, reader) = spawn_combined(cmd, &program)?;

        Ok(Execution {
            command: command.to_string(),
            child,
            output: OutputCollector::start(reader)?,
            started: Instant::now(),
        })
    }
}

/// A command running on a background thread
#[derive(Debug)]
pub struct RunningCommand {
    command: String,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<Result<CapturedOutput>>,
}

impl RunningCommand {
    /// The command line being run
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Kill the child; `wait` then returns a `Cancelled` error
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// True once the background thread has finished
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the command finishes
    pub fn wait(self) -> Result<CapturedOutput> {
        self.thread
            .join()
            .map_err(|_| Error::internal(format!("Runner thread panicked: {}", self.command)))?
    }
}

struct Execution {
    command: String,
    child: Child,
    output: OutputCollector,
    started: Instant,
}

impl Execution {
    fn finish(mut self, timeout: Option<Duration>, cancel: &AtomicBool) -> Result<CapturedOutput> {
        let deadline = timeout.map(|t| self.started + t);

        let status = loop {
            if cancel.load(Ordering::SeqCst) {
                self.kill();
                warn!(command = %self.command, "command cancelled");
                return Err(Error::cancelled(&self.command));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.kill();
                let limit = timeout.unwrap_or_default();
                warn!(command = %self.command, timeout_ms = limit.as_millis() as u64, "command timed out; killed");
                return Err(Error::timeout(&self.command, limit));
            }
            match self.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    self.kill();
                    return Err(Error::process(format!("Failed to wait for {}: {}", self.command, e))
                        .with_source(e));
                }
            }
        };

        let duration = self.started.elapsed();
        let bytes = self.output.collect(DRAIN_TIMEOUT);
        let captured = CapturedOutput::new(&self.command, bytes, Termination::from(status), duration);

        info!(
            command = %captured.command,
            exit_code = captured.exit_code,
            duration_ms = duration.as_millis() as u64,
            bytes = captured.bytes.len(),
            "command finished"
        );
        for warning in &captured.warnings {
            warn!(command = %captured.command, "{}", warning);
        }

        Ok(captured)
    }

    fn kill(&mut self) {
        // Fails only if the child already exited, which is fine here.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reads a pipe to EOF on its own thread so the child never blocks on a full pipe
struct OutputCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: std::sync::mpsc::Receiver<()>,
}

impl OutputCollector {
    fn start(mut reader: PipeReader) -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let (tx, done) = std::sync::mpsc::channel();

        thread::Builder::new()
            .name("droidbar-output".to_string())
            .spawn(move || {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = sink.lock() {
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!(error = %e, "output pipe read failed");
                            break;
                        }
                    }
                }
                let _ = tx.send(());
            })
            .map_err(|e| Error::internal(format!("Failed to start output reader: {}", e)))?;

        Ok(Self { buffer, done })
    }

    /// Wait up to `grace` for EOF, then take everything read so far
    fn collect(self, grace: Duration) -> Vec<u8> {
        if self.done.recv_timeout(grace).is_err() {
            debug!("output pipe still open after exit; a background process may hold it");
        }
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Spawn `cmd` with stdout and stderr sharing one pipe
///
/// `cmd` is consumed so its copies of the write end are closed once the child
/// owns them; otherwise the reader would never see EOF.
pub(crate) fn spawn_combined(mut cmd: Command, program: &str) -> Result<(Child, PipeReader)> {
    let (reader, writer) = std::io::pipe().map_err(|e| Error::spawn(program, e))?;
    let writer_err = writer.try_clone().map_err(|e| Error::spawn(program, e))?;

    cmd.stdout(writer).stderr(writer_err);
    let child = cmd.spawn().map_err(|e| Error::spawn(program, e))?;
    drop(cmd);

    Ok((child, reader))
}

/// The shell used when none is configured
pub fn default_shell() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from("cmd.exe")
    }
    #[cfg(not(windows))]
    {
        let zsh = Path::new("/bin/zsh");
        if zsh.exists() {
            zsh.to_path_buf()
        } else {
            PathBuf::from("/bin/sh")
        }
    }
}

fn shell_flag(shell: &Path) -> &'static str {
    let name = shell
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name == "cmd" || name == "cmd.exe" {
        "/C"
    } else {
        "-c"
    }
}

/// Quote one word for a POSIX shell command line
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Check if a command exists in PATH
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Get the path to a command
pub fn which_command(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

//! Long-running process watcher with streamed output
//!
//! [`LogWatcher`] starts one child process and hands its combined stdout and
//! stderr to a [`WatchSink`] as chunks arrive. Chunks follow whatever the pipe
//! returns, so they carry no line alignment; only UTF-8 characters are kept
//! whole across chunk boundaries.
//!
//! The child is owned by the session. Callers get a [`WatchHandle`] (or a
//! cloneable [`WatchCanceller`]) that can stop it. Once `cancel()` returns no
//! further chunk reaches the sink.
//!
//! ```rust,no_run
//! use droidbar_core::watch::LogWatcher;
//!
//! let handle = LogWatcher::new("adb")
//!     .args(["logcat"])
//!     .start(|chunk: &str| print!("{}", chunk))
//!     .expect("adb not available");
//!
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! handle.cancel();
//! ```

use crate::decode::Utf8ChunkDecoder;
use crate::error::{Error, Result};
use crate::process::{spawn_combined, Termination, DRAIN_TIMEOUT};
use std::ffi::OsString;
use std::io::{PipeReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const REAP_INTERVAL: Duration = Duration::from_millis(20);

/// Receives output from a watch session
///
/// Called on the session's own thread, never on the thread that started
/// the session.
pub trait WatchSink: Send + 'static {
    /// New output is available
    fn on_chunk(&mut self, chunk: &str);

    /// The session ended on its own; called once, after the last chunk
    fn on_exit(&mut self, _status: &WatchStatus) {}
}

impl<F> WatchSink for F
where
    F: FnMut(&str) + Send + 'static,
{
    fn on_chunk(&mut self, chunk: &str) {
        self(chunk)
    }
}

/// Terminal status of a watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    /// The child exited on its own
    Exited(Termination),
    /// The owner cancelled the session
    Cancelled,
    /// Reading the output stream failed
    Failed(String),
}

impl std::fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchStatus::Exited(termination) => write!(f, "exited with {}", termination),
            WatchStatus::Cancelled => write!(f, "cancelled"),
            WatchStatus::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Events for consumers that read a session from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A decoded output chunk
    Chunk(String),
    /// The session ended on its own
    Exit(WatchStatus),
}

struct ChannelSink(UnboundedSender<WatchEvent>);

impl WatchSink for ChannelSink {
    fn on_chunk(&mut self, chunk: &str) {
        // The receiver going away just means nobody is listening anymore.
        let _ = self.0.send(WatchEvent::Chunk(chunk.to_string()));
    }

    fn on_exit(&mut self, status: &WatchStatus) {
        let _ = self.0.send(WatchEvent::Exit(status.clone()));
    }
}

/// Builder for a watch session
#[derive(Debug, Clone)]
pub struct LogWatcher {
    executable: PathBuf,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
}

impl LogWatcher {
    /// Watch `executable`, resolved through PATH when it is a bare name
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Start the child and stream its output into `sink`
    pub fn start(self, sink: impl WatchSink) -> Result<WatchHandle> {
        let program = self.executable.display().to_string();
        let executable = resolve_executable(&self.executable)?;

        let mut cmd = Command::new(&executable);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        debug!(program = %program, args = ?self.args, "starting watch session");
        let (child, reader) = spawn_combined(cmd, &program)?;
        let pid = child.id();

        let shared = Arc::new(Shared {
            program: program.clone(),
            cancelled: AtomicBool::new(false),
            delivery: Mutex::new(()),
            sink_thread: OnceLock::new(),
            child: Mutex::new(child),
            status: Mutex::new(None),
        });

        // The reader may outlive the session when a background process keeps
        // the pipe open; it ends on EOF or once nobody receives.
        let (tx, events) = mpsc::channel();
        let reader_thread = thread::Builder::new()
            .name("droidbar-watch-read".to_string())
            .spawn(move || read_pipe(reader, tx));
        if let Err(e) = reader_thread {
            shared.kill();
            let _ = shared.reap();
            return Err(Error::internal(format!("Failed to start watch reader: {}", e)));
        }

        let pump_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("droidbar-watch".to_string())
            .spawn(move || pump(pump_shared, events, sink));

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                shared.kill();
                let _ = shared.reap();
                return Err(Error::internal(format!("Failed to start watch thread: {}", e)));
            }
        };

        info!(program = %program, pid, "watch session started");
        Ok(WatchHandle {
            shared,
            thread: Some(thread),
        })
    }

    /// Start the child and deliver its output through a channel
    ///
    /// A cancelled session closes the channel without an `Exit` event.
    pub fn start_channel(self) -> Result<(WatchHandle, UnboundedReceiver<WatchEvent>)> {
        let (tx, rx) = unbounded_channel();
        let handle = self.start(ChannelSink(tx))?;
        Ok((handle, rx))
    }
}

fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    if executable.components().count() > 1 || executable.is_absolute() {
        return Ok(executable.to_path_buf());
    }
    let name = executable.to_string_lossy();
    which::which(name.as_ref()).map_err(|_| Error::command_not_found(&name))
}

/// Owner's handle on a running watch session
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct WatchHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the child; no chunk is delivered after this returns
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// A cloneable handle that can only cancel
    pub fn canceller(&self) -> WatchCanceller {
        WatchCanceller {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Terminal status, once the session has stopped
    pub fn status(&self) -> Option<WatchStatus> {
        lock(&self.shared.status).clone()
    }

    /// True until the session has stopped
    pub fn is_running(&self) -> bool {
        self.status().is_none()
    }

    /// The executable being watched
    pub fn program(&self) -> &str {
        &self.shared.program
    }

    /// Block until the session stops and return its terminal status
    pub fn wait(mut self) -> WatchStatus {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(program = %self.shared.program, "watch sink panicked");
                self.shared.kill();
                return WatchStatus::Failed("watch sink panicked".to_string());
            }
        }
        self.status().unwrap_or(WatchStatus::Cancelled)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shared.cancel();
        }
    }
}

/// Cancel-only reference to a watch session
#[derive(Debug, Clone)]
pub struct WatchCanceller {
    shared: Arc<Shared>,
}

impl WatchCanceller {
    /// Stop the child; no chunk is delivered after this returns
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// True once the session was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Shared {
    program: String,
    cancelled: AtomicBool,
    /// Held while the sink runs, so `cancel` can wait out an in-flight chunk
    delivery: Mutex<()>,
    sink_thread: OnceLock<ThreadId>,
    child: Mutex<Child>,
    status: Mutex<Option<WatchStatus>>,
}

impl Shared {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(program = %self.program, "cancelling watch session");
            self.kill();
        }
        // From inside the sink the delivery lock is already ours; the session
        // thread checks the flag again before the next chunk.
        if self.sink_thread.get() != Some(&thread::current().id()) {
            drop(lock(&self.delivery));
        }
    }

    fn kill(&self) {
        // Errors mean the child already exited.
        let _ = lock(&self.child).kill();
    }

    /// Run `f` unless cancelled; false once the session is cancelled
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let _guard = lock(&self.delivery);
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        f();
        true
    }

    /// Exit status if the child has ended, without blocking
    fn try_reap(&self) -> Option<Termination> {
        match lock(&self.child).try_wait() {
            Ok(Some(status)) => Some(Termination::from(status)),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "try_wait failed");
                Some(Termination::Unknown)
            }
        }
    }

    fn reap(&self) -> Termination {
        loop {
            if let Some(termination) = self.try_reap() {
                return termination;
            }
            thread::sleep(REAP_INTERVAL);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum ReadEvent {
    Data(Vec<u8>),
    Failed(String),
}

fn read_pipe(mut reader: PipeReader, tx: Sender<ReadEvent>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ReadEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(ReadEvent::Failed(e.to_string()));
                break;
            }
        }
    }
}

/// Session loop: delivers chunks and watches the child independently of EOF
///
/// Once the child has exited, output still arriving is read for at most
/// `DRAIN_TIMEOUT`; a background process holding the pipe cannot keep the
/// session alive.
fn pump(shared: Arc<Shared>, events: Receiver<ReadEvent>, mut sink: impl WatchSink) {
    let _ = shared.sink_thread.set(thread::current().id());
    let mut decoder = Utf8ChunkDecoder::new();
    let mut chunks = 0u64;
    let mut exited: Option<Termination> = None;
    let mut drain_until: Option<Instant> = None;
    let mut next_poll = Instant::now();

    let failure = loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            break None;
        }

        let now = Instant::now();
        if exited.is_none() && now >= next_poll {
            exited = shared.try_reap();
            next_poll = now + REAP_INTERVAL;
            if exited.is_some() {
                drain_until = Some(now + DRAIN_TIMEOUT);
            }
        }
        if drain_until.is_some_and(|deadline| now >= deadline) {
            debug!(program = %shared.program, "output still open after exit; a background process may hold it");
            break None;
        }

        match events.recv_timeout(REAP_INTERVAL) {
            Ok(ReadEvent::Data(bytes)) => {
                let text = decoder.decode(&bytes);
                if text.is_empty() {
                    continue;
                }
                chunks += 1;
                if !shared.deliver(|| sink.on_chunk(&text)) {
                    break None;
                }
            }
            Ok(ReadEvent::Failed(msg)) => break Some(msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break None,
        }
    };
    drop(events);

    let rest = decoder.finish();
    if !rest.is_empty() {
        shared.deliver(|| sink.on_chunk(&rest));
    }
    if decoder.replaced_invalid() {
        warn!(program = %shared.program, "watch output contained invalid UTF-8");
    }

    let status = if let Some(msg) = failure {
        shared.kill();
        let _ = shared.reap();
        WatchStatus::Failed(msg)
    } else {
        let termination = match exited {
            Some(termination) => termination,
            None => shared.reap(),
        };
        if shared.cancelled.load(Ordering::SeqCst) {
            WatchStatus::Cancelled
        } else {
            WatchStatus::Exited(termination)
        }
    };

    info!(program = %shared.program, chunks, status = %status, "watch session stopped");
    shared.deliver(|| sink.on_exit(&status));
    *lock(&shared.status) = Some(status);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        chunks: Arc<Mutex<Vec<String>>>,
        exits: Arc<Mutex<Vec<WatchStatus>>>,
    }

    impl Recorder {
        fn text(&self) -> String {
            self.chunks.lock().unwrap().concat()
        }

        fn chunk_count(&self) -> usize {
            self.chunks.lock().unwrap().len()
        }
    }

    impl WatchSink for Recorder {
        fn on_chunk(&mut self, chunk: &str) {
            self.chunks.lock().unwrap().push(chunk.to_string());
        }

        fn on_exit(&mut self, status: &WatchStatus) {
            self.exits.lock().unwrap().push(status.clone());
        }
    }

    fn sh(script: &str) -> LogWatcher {
        LogWatcher::new("/bin/sh").args(["-c", script])
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_chunks_reproduce_interleaved_stream() {
        let script = "i=0; while [ $i -lt 2000 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done";
        let recorder = Recorder::default();
        let handle = sh(script).start(recorder.clone()).unwrap();

        let status = handle.wait();
        assert_eq!(status, WatchStatus::Exited(Termination::Exited(0)));

        let expected: String = (0..2000).map(|i| format!("out{i}\nerr{i}\n")).collect();
        assert_eq!(recorder.text(), expected);
    }

    #[test]
    fn test_exit_reported_once_after_last_chunk() {
        let recorder = Recorder::default();
        let handle = sh("echo done; exit 3").start(recorder.clone()).unwrap();

        assert_eq!(handle.wait(), WatchStatus::Exited(Termination::Exited(3)));
        assert_eq!(recorder.text(), "done\n");
        assert_eq!(
            *recorder.exits.lock().unwrap(),
            vec![WatchStatus::Exited(Termination::Exited(3))]
        );
    }

    #[test]
    fn test_cancel_stops_chunks() {
        let recorder = Recorder::default();
        let handle = sh("while true; do echo tick; sleep 0.05; done")
            .start(recorder.clone())
            .unwrap();

        wait_until(|| recorder.chunk_count() >= 2);
        handle.cancel();
        let after_cancel = recorder.chunk_count();

        thread::sleep(Duration::from_millis(300));
        assert_eq!(recorder.chunk_count(), after_cancel);
        assert_eq!(handle.wait(), WatchStatus::Cancelled);
        assert!(recorder.exits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent_after_exit() {
        let recorder = Recorder::default();
        let handle = sh("echo once").start(recorder.clone()).unwrap();

        wait_until(|| !handle.is_running());
        let chunks = recorder.chunk_count();

        handle.cancel();
        handle.cancel();

        assert_eq!(recorder.chunk_count(), chunks);
        assert_eq!(recorder.exits.lock().unwrap().len(), 1);
        assert_eq!(handle.status(), Some(WatchStatus::Exited(Termination::Exited(0))));
    }

    #[test]
    fn test_cancel_from_inside_sink() {
        let slot: Arc<OnceLock<WatchCanceller>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(0usize));

        let sink_slot = Arc::clone(&slot);
        let sink_seen = Arc::clone(&seen);
        let handle = sh("while true; do echo tick; sleep 0.05; done")
            .start(move |_chunk: &str| {
                *sink_seen.lock().unwrap() += 1;
                if let Some(canceller) = sink_slot.get() {
                    canceller.cancel();
                }
            })
            .unwrap();
        let _ = slot.set(handle.canceller());

        assert_eq!(handle.wait(), WatchStatus::Cancelled);
        assert!(*seen.lock().unwrap() >= 1);
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let err = LogWatcher::new("/nonexistent/droidbar/adb")
            .start(|_: &str| {})
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SpawnFailed);

        let err = LogWatcher::new("nonexistent_command_12345")
            .start(|_: &str| {})
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandNotFound);
        assert!(err.is_spawn_error());
    }

    #[test]
    fn test_drop_cancels_session() {
        let recorder = Recorder::default();
        let handle = sh("while true; do echo tick; sleep 0.05; done")
            .start(recorder.clone())
            .unwrap();
        let canceller = handle.canceller();

        wait_until(|| recorder.chunk_count() >= 1);
        drop(handle);

        assert!(canceller.is_cancelled());
        let count = recorder.chunk_count();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(recorder.chunk_count(), count);
    }

    #[test]
    fn test_cancel_returns_while_background_process_holds_output() {
        let recorder = Recorder::default();
        let handle = sh("sleep 5 & while true; do echo tick; sleep 0.05; done")
            .start(recorder.clone())
            .unwrap();

        wait_until(|| recorder.chunk_count() >= 2);
        let started = Instant::now();
        handle.cancel();

        assert_eq!(handle.wait(), WatchStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_exit_reported_while_background_process_holds_output() {
        let recorder = Recorder::default();
        let started = Instant::now();
        let handle = sh("sleep 5 & echo done; exit 0").start(recorder.clone()).unwrap();

        assert_eq!(handle.wait(), WatchStatus::Exited(Termination::Exited(0)));
        assert!(started.elapsed() < DRAIN_TIMEOUT + Duration::from_secs(2));
        assert_eq!(recorder.text(), "done\n");
        assert_eq!(recorder.exits.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_external_signal_reported_as_exit() {
        let recorder = Recorder::default();
        let handle = sh("kill -TERM $$").start(recorder.clone()).unwrap();

        let status = handle.wait();
        assert_eq!(status, WatchStatus::Exited(Termination::Signaled(15)));
        assert_eq!(*recorder.exits.lock().unwrap(), vec![status]);
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let (handle, mut rx) = sh("printf 'a\\n'; printf 'b\\n' >&2").start_channel().unwrap();

        let mut text = String::new();
        let mut exit = None;
        while let Some(event) = rx.recv().await {
            match event {
                WatchEvent::Chunk(chunk) => text.push_str(&chunk),
                WatchEvent::Exit(status) => exit = Some(status),
            }
        }

        assert_eq!(text, "a\nb\n");
        assert_eq!(exit, Some(WatchStatus::Exited(Termination::Exited(0))));
        assert!(!handle.is_running());
    }
}

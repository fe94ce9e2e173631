//! Logcat tail with at most one running session
//!
//! Starting a new tail while one is running cancels the old one first.

use crate::adb::Adb;
use droidbar_core::error::Result;
use droidbar_core::watch::{WatchEvent, WatchHandle, WatchSink, WatchStatus};
use tokio::sync::mpsc::UnboundedReceiver;

/// Owns the single logcat session of its caller
#[derive(Debug)]
pub struct LogTail {
    adb: Adb,
    extra_args: Vec<String>,
    session: Option<WatchHandle>,
}

impl LogTail {
    /// Tail logcat through `adb`
    pub fn new(adb: Adb) -> Self {
        Self {
            adb,
            extra_args: Vec::new(),
            session: None,
        }
    }

    /// Extra logcat arguments, e.g. a filter spec
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// True while a session is open and its process is alive
    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(WatchHandle::is_running)
    }

    /// Start streaming into `sink`, cancelling any running session first
    pub fn start(&mut self, sink: impl WatchSink) -> Result<()> {
        self.stop();
        let handle = self.adb.logcat(&self.extra_args).start(sink)?;
        self.session = Some(handle);
        Ok(())
    }

    /// Start streaming into a channel, cancelling any running session first
    pub fn start_channel(&mut self) -> Result<UnboundedReceiver<WatchEvent>> {
        self.stop();
        let (handle, rx) = self.adb.logcat(&self.extra_args).start_channel()?;
        self.session = Some(handle);
        Ok(rx)
    }

    /// Cancel the running session and return how it ended
    pub fn stop(&mut self) -> Option<WatchStatus> {
        let handle = self.session.take()?;
        handle.cancel();
        Some(handle.wait())
    }

    /// Stop if running, otherwise start; returns whether it is now running
    pub fn toggle(&mut self, sink: impl WatchSink) -> Result<bool> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start(sink)?;
            Ok(true)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::script;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn fake_adb(dir: &std::path::Path) -> Adb {
        Adb::new(script(
            dir,
            "adb",
            "while true; do echo \"$1 $2\"; sleep 0.05; done",
        ))
    }

    fn collector() -> (Arc<Mutex<String>>, impl WatchSink) {
        let text = Arc::new(Mutex::new(String::new()));
        let sink_text = Arc::clone(&text);
        (text, move |chunk: &str| sink_text.lock().unwrap().push_str(chunk))
    }

    fn wait_for(text: &Arc<Mutex<String>>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while text.lock().unwrap().is_empty() {
            assert!(Instant::now() < deadline, "no logcat output");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = LogTail::new(fake_adb(dir.path())).with_args(vec!["-v".to_string()]);
        let (text, sink) = collector();

        tail.start(sink).unwrap();
        assert!(tail.is_running());
        wait_for(&text);
        assert!(text.lock().unwrap().starts_with("logcat -v"));

        assert_eq!(tail.stop(), Some(WatchStatus::Cancelled));
        assert!(!tail.is_running());
        assert_eq!(tail.stop(), None);
    }

    #[test]
    fn test_second_start_cancels_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = LogTail::new(fake_adb(dir.path()));
        let (first, first_sink) = collector();
        let (second, second_sink) = collector();

        tail.start(first_sink).unwrap();
        wait_for(&first);
        tail.start(second_sink).unwrap();

        let frozen = first.lock().unwrap().len();
        wait_for(&second);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(first.lock().unwrap().len(), frozen);
        assert!(tail.is_running());
        tail.stop();
    }

    #[test]
    fn test_stop_does_not_wait_for_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let adb = Adb::new(script(
            dir.path(),
            "adb",
            "sleep 5 &\nwhile true; do echo line; sleep 0.05; done",
        ));
        let mut tail = LogTail::new(adb);
        let (text, sink) = collector();

        tail.start(sink).unwrap();
        wait_for(&text);

        let started = Instant::now();
        assert_eq!(tail.stop(), Some(WatchStatus::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = LogTail::new(fake_adb(dir.path()));

        let (_, sink) = collector();
        assert!(tail.toggle(sink).unwrap());
        let (_, sink) = collector();
        assert!(!tail.toggle(sink).unwrap());
        assert!(!tail.is_running());
    }
}

//! Timestamped event log for command and lock-status lines.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

/// Sink for per-operation command and synchronization events.
///
/// Implementations serialize callers so that lines never interleave.
pub trait EventSink: Send + Sync {
    /// Write `<ts>,THREAD <priority>,<text>`.
    fn log_command(&self, priority: u32, text: &str);

    /// Write `<ts>,THREAD <priority><status>`.
    fn log_status(&self, priority: u32, status: &str);
}

/// Line-oriented event log over any writer.
pub struct EventLog<W: Write + Send> {
    writer: Mutex<W>,
}

impl EventLog<File> {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl EventLog<Vec<u8>> {
    pub fn in_memory() -> Self {
        Self::new(Vec::new())
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.writer.lock()).into_owned()
    }
}

impl<W: Write + Send> EventLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_line(&self, priority: u32, separator: &str, text: &str) {
        let mut writer = self.writer.lock();
        // Stamped under the lock so timestamps never go backwards in the file.
        let timestamp = Utc::now().timestamp_micros();
        let result = writeln!(writer, "{timestamp},THREAD {priority}{separator}{text}")
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            warn!("Failed to write event for thread {}: {}", priority, e);
        }
    }
}

impl<W: Write + Send> EventSink for EventLog<W> {
    fn log_command(&self, priority: u32, text: &str) {
        self.write_line(priority, ",", text);
    }

    fn log_status(&self, priority: u32, status: &str) {
        self.write_line(priority, "", status);
    }
}

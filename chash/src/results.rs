//! Append-only sink for human-readable results.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::warn;

/// Raw text sink; no framing is added to what callers append.
pub trait ResultSink: Send + Sync {
    fn append(&self, text: &str);

    fn appendf(&self, args: fmt::Arguments<'_>);
}

pub struct ResultLog<W: Write + Send> {
    writer: Mutex<W>,
}

impl ResultLog<File> {
    /// Create (or truncate) the output file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl ResultLog<Vec<u8>> {
    pub fn in_memory() -> Self {
        Self::new(Vec::new())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.writer.lock()).into_owned()
    }
}

impl<W: Write + Send> ResultLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> ResultSink for ResultLog<W> {
    fn append(&self, text: &str) {
        self.appendf(format_args!("{text}"));
    }

    fn appendf(&self, args: fmt::Arguments<'_>) {
        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_fmt(args).and_then(|()| writer.flush()) {
            warn!("Failed to append result: {}", e);
        }
    }
}

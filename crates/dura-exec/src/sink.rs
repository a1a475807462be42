//! Destinations for task output and user-visible notices.
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

/// Receives incremental task output and supervisor notices.
pub trait LogSink: Send + Sync + 'static {
    /// Raw bytes copied from the task's log.
    fn write(&self, bytes: &[u8]);
    /// One notice line (e.g. "Sending interrupt signal to process").
    fn println(&self, line: &str);
}

/// Shared handle to a log sink.
pub type SinkHandle = Arc<dyn LogSink>;

/// Configuration for [`TracingSink`].
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Max line length before truncation.
    pub max_line_length: usize,
    /// Emit task output at INFO level (false = DEBUG).
    pub output_info: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            output_info: true,
        }
    }
}

/// Forwards task output line by line to `tracing`.
///
/// Bytes after the last newline are held back until the line completes, or until they exceed
/// `max_line_length` bytes; an overlong line is then flushed early and truncated.
#[derive(Debug, Default)]
pub struct TracingSink {
    config: LogConfig,
    partial: Mutex<Vec<u8>>,
}

impl TracingSink {
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            partial: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let line = match line.char_indices().nth(self.config.max_line_length) {
            Some((cut, _)) => &line[..cut],
            None => line,
        };
        if self.config.output_info {
            info!(target: "dura::output", "{line}");
        } else {
            debug!(target: "dura::output", "{line}");
        }
    }
}

impl LogSink for TracingSink {
    fn write(&self, bytes: &[u8]) {
        let Ok(mut partial) = self.partial.lock() else {
            return;
        };
        partial.extend_from_slice(bytes);
        if let Some(last) = partial.iter().rposition(|&b| b == b'\n') {
            let rest = partial.split_off(last + 1);
            for line in partial.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
                self.emit(line);
            }
            *partial = rest;
        }
        if partial.len() > self.config.max_line_length {
            self.emit(&partial);
            partial.clear();
        }
    }

    fn println(&self, line: &str) {
        info!(target: "dura::notice", "{line}");
    }
}

/// Collects everything in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Mutex<Vec<u8>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        self.buf
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl LogSink for BufferSink {
    fn write(&self, bytes: &[u8]) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.extend_from_slice(bytes);
        }
    }

    fn println(&self, line: &str) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
    }
}

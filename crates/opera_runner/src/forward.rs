//! Line-prefixed forwarding of container output.
//!
//! Container output arrives in arbitrary chunks. [`LogForwarder`] buffers
//! partial lines and writes every complete line to its sink with a fixed
//! prefix, so interleaved output from several containers stays readable.
//! A bare `\r` ends a line too, so TTY progress bars come out one update
//! per line.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Partial lines longer than this are written out as they are.
const MAX_PENDING: usize = 64 * 1024;

/// Destination for forwarded output lines.
pub type LogSink = Arc<Mutex<dyn Write + Send>>;

/// Sink writing to the process's stdout.
pub fn stdout_sink() -> LogSink {
    Arc::new(Mutex::new(io::stdout()))
}

/// Splits byte chunks into lines and writes them with a prefix.
pub struct LogForwarder {
    prefix: String,
    pending: Vec<u8>,
    /// Last byte seen was `\r`; a following `\n` belongs to the same break.
    after_cr: bool,
    sink: LogSink,
}

impl LogForwarder {
    pub fn new(prefix: impl Into<String>, sink: LogSink) -> Self {
        Self {
            prefix: prefix.into(),
            pending: Vec::new(),
            after_cr: false,
            sink,
        }
    }

    /// Feed a chunk; every complete line in it is written immediately.
    pub fn push(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut sink = self.sink.lock();
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\n' | b'\r' => {
                    self.after_cr = byte == b'\r';
                    write_line(&mut *sink, &self.prefix, &self.pending)?;
                    self.pending.clear();
                }
                _ => {
                    self.after_cr = false;
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_PENDING {
                        write_line(&mut *sink, &self.prefix, &self.pending)?;
                        self.pending.clear();
                    }
                }
            }
        }
        sink.flush()
    }

    /// Write out any trailing partial line.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rest = std::mem::take(&mut self.pending);
        let mut sink = self.sink.lock();
        write_line(&mut *sink, &self.prefix, &rest)?;
        sink.flush()
    }
}

fn write_line(sink: &mut (dyn Write + Send), prefix: &str, line: &[u8]) -> io::Result<()> {
    sink.write_all(prefix.as_bytes())?;
    sink.write_all(line)?;
    sink.write_all(b"\n")
}

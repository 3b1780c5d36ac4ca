//! Best-effort, non-blocking drain of the worker's error stream.

use std::fs::File;
use std::io::{self, Read};

use tracing::{debug, info};

use crate::pipe::NonBlocking;

const CHUNK_SIZE: usize = 8 * 1024;

/// Most stderr bytes held between drains; older bytes are dropped first.
pub const MAX_PENDING_LOG: usize = 1024 * 1024;

/// Read side of the worker's stderr pipe.
///
/// The descriptor stays in blocking mode between reads; each read flips it
/// to non-blocking, takes whatever is immediately available, and flips it
/// back. Bytes read but not yet handed out wait in a buffer, so the pipe
/// can be emptied while a request is in flight (a worker blocked on a full
/// stderr pipe never answers) and a character split across two reads is
/// decoded whole.
pub struct LogDrain {
    file: File,
    pending: Vec<u8>,
    partial: String,
    eof: bool,
}

impl LogDrain {
    pub(crate) fn new(file: File) -> Self {
        Self {
            file,
            pending: Vec::new(),
            partial: String::new(),
            eof: false,
        }
    }

    /// Everything the worker has written to stderr since the last drain.
    ///
    /// A trailing incomplete UTF-8 sequence is kept for the next call until
    /// the pipe closes.
    pub fn drain(&mut self) -> io::Result<String> {
        self.fill()?;
        let end = if self.eof {
            self.pending.len()
        } else {
            complete_utf8_len(&self.pending)
        };
        let text = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.drain(..end);
        Ok(text)
    }

    /// Re-emit complete stderr lines as `tracing` events. A trailing partial
    /// line is held back until its newline arrives (or the pipe closes).
    ///
    /// Returns the number of lines emitted.
    pub fn forward(&mut self) -> io::Result<usize> {
        let text = self.drain()?;
        self.partial.push_str(&text);

        let mut emitted = 0;
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            info!(target: "worker", "{}", line.trim_end());
            emitted += 1;
        }
        if self.eof && !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            info!(target: "worker", "{line}");
            emitted += 1;
        }
        Ok(emitted)
    }

    /// True once the worker has closed its end of the pipe.
    pub fn is_closed(&self) -> bool {
        self.eof
    }

    /// Move whatever the pipe holds right now into the pending buffer.
    pub(crate) fn fill(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }

        let _nonblocking = NonBlocking::enable(&self.file)?;
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match (&self.file).read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.pending.len() > MAX_PENDING_LOG {
            let dropped = self.pending.len() - MAX_PENDING_LOG;
            self.pending.drain(..dropped);
            debug!(dropped, "worker log buffer full, dropped oldest bytes");
        }
        Ok(())
    }
}

/// Length of the prefix of `bytes` that ends on a character boundary.
/// Invalid sequences count as complete (they decode to U+FFFD); only an
/// unfinished sequence at the very end is excluded.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    let mut at = 0;
    loop {
        match std::str::from_utf8(&bytes[at..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(bad) => at += e.valid_up_to() + bad,
                None => return at + e.valid_up_to(),
            },
        }
    }
}

//! Half-duplex line transport: one request line out, one response line in.

use std::io;
use std::time::Duration;

use protocol::Envelope;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, trace};

use crate::drain::LogDrain;
use crate::error::{Error, Result};
use crate::supervisor::ProcessSupervisor;

/// Maximum response line size including the newline (16MB).
/// Sized for long transcriptions.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// How often worker stderr is emptied while a request is in flight.
const LOG_PUMP_INTERVAL: Duration = Duration::from_millis(5);

/// Write one newline-terminated line and flush immediately.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    if !line.ends_with('\n') {
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}

/// Read exactly one line and parse it as an envelope.
///
/// End of stream before a newline is a read failure, even if some bytes
/// arrived. Bytes that are not UTF-8 JSON make a malformed response. At
/// most [`MAX_RESPONSE_SIZE`] bytes are buffered.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Envelope>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let limit = MAX_RESPONSE_SIZE as u64 + 1;
    reader
        .take(limit)
        .read_until(b'\n', &mut line)
        .await
        .map_err(Error::Read)?;

    if line.len() > MAX_RESPONSE_SIZE {
        return Err(Error::ResponseTooLarge {
            max: MAX_RESPONSE_SIZE,
        });
    }
    let Some(body) = line.strip_suffix(b"\n") else {
        return Err(Error::Read(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "worker closed its output stream",
        )));
    };
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    serde_json::from_slice(body).map_err(|source| Error::MalformedResponse {
        line: String::from_utf8_lossy(body).into_owned(),
        source,
    })
}

/// Drive `io` to completion, emptying the worker's stderr pipe into its
/// [`LogDrain`] buffer every [`LOG_PUMP_INTERVAL`]. A worker blocked on a
/// full stderr pipe would otherwise never read the request or write the
/// response.
async fn pump_logs<F: Future>(stderr: Option<&mut LogDrain>, io: F) -> F::Output {
    tokio::pin!(io);
    let Some(stderr) = stderr else {
        return io.await;
    };

    let mut ticker = interval(LOG_PUMP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            output = &mut io => return output,
            _ = ticker.tick() => {
                if let Err(e) = stderr.fill() {
                    debug!(error = %e, "failed to read worker stderr");
                }
            }
        }
    }
}

fn not_running() -> Error {
    Error::Write(io::Error::new(
        io::ErrorKind::NotConnected,
        "worker is not running",
    ))
}

/// Writes envelopes to the worker's stdin and reads responses from its stdout.
///
/// There is never more than one request in flight: `send` takes `&mut self`,
/// writes, and (for requests) performs exactly one line read before
/// returning.
pub struct RpcTransport {
    supervisor: ProcessSupervisor,
    read_timeout: Option<Duration>,
}

impl RpcTransport {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self {
            supervisor,
            read_timeout: None,
        }
    }

    /// Bound each response read. After a timeout the stream position is
    /// unknown, so the worker should be stopped rather than reused.
    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ProcessSupervisor {
        &mut self.supervisor
    }

    /// Send an envelope. Notifications return `None` without reading;
    /// requests return the single response line that follows.
    ///
    /// Worker stderr is buffered while this runs; collect it with
    /// [`ProcessSupervisor::drain_logs`] or `forward_logs`.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<Option<Envelope>> {
        if !self.supervisor.is_running() {
            return Err(not_running());
        }
        let line = envelope.to_line().map_err(Error::Serialize)?;
        let handle = self.supervisor.handle_mut().ok_or_else(not_running)?;
        let (stdin, stdout, mut stderr) = handle.streams();

        trace!(line = line.trim_end(), "-> worker");
        let stdin = stdin.ok_or_else(not_running)?;
        pump_logs(stderr.as_deref_mut(), write_line(stdin, &line))
            .await
            .map_err(Error::Write)?;

        if envelope.is_notification() {
            return Ok(None);
        }

        let stdout = stdout.ok_or_else(|| {
            Error::Read(io::Error::new(
                io::ErrorKind::NotConnected,
                "worker output stream is closed",
            ))
        })?;
        let read = pump_logs(stderr, read_envelope(stdout));
        let response = match self.read_timeout {
            Some(limit) => timeout(limit, read).await.map_err(|_| Error::Timeout)??,
            None => read.await?,
        };
        trace!(id = ?response.id, "<- worker");
        Ok(Some(response))
    }
}

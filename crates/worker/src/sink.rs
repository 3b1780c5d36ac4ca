//! Where response envelopes go.

use std::io::{self, Write};

use protocol::Envelope;

/// Accepts response envelopes from the worker loop.
pub trait ResponseSink {
    fn send_response(&mut self, response: &Envelope) -> io::Result<()>;
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn send_response(&mut self, response: &Envelope) -> io::Result<()> {
        (**self).send_response(response)
    }
}

/// Writes each response as one JSON line and flushes immediately.
pub struct StdioSink<W = io::Stdout> {
    writer: W,
}

impl StdioSink {
    /// A sink over the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StdioSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResponseSink for StdioSink<W> {
    fn send_response(&mut self, response: &Envelope) -> io::Result<()> {
        let line = response.to_line().map_err(io::Error::other)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()
    }
}

/// Collects responses in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub responses: Vec<Envelope>,
}

impl ResponseSink for MemorySink {
    fn send_response(&mut self, response: &Envelope) -> io::Result<()> {
        self.responses.push(response.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::RequestId;
    use serde_json::json;

    #[test]
    fn stdio_sink_writes_one_line_per_response() {
        let mut sink = StdioSink::new(Vec::new());
        sink.send_response(&Envelope::success(RequestId::Number(1), json!({"tools": []})))
            .unwrap();
        sink.send_response(&Envelope::success(RequestId::Number(2), json!("a\nb")))
            .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#);
        assert!(out.ends_with('\n'));
    }
}

//! Worker read loop: one line in, at most one response line out.

use std::io::{self, BufRead};
use std::panic::{self, AssertUnwindSafe};

use protocol::{Envelope, ErrorObject};
use tracing::{debug, error, info, warn};

use crate::logfmt::clip;
use crate::sink::ResponseSink;

/// Turns one request envelope into at most one response envelope.
///
/// Implementations must return `None` for envelopes without an `id`.
pub trait Handler {
    fn handle(&mut self, request: Envelope) -> Option<Envelope>;
}

/// Counters reported when the input stream closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub responded: usize,
    pub skipped: usize,
}

/// Serve requests from `reader` until end of input.
///
/// Empty lines, unparseable lines, and lines without the `"2.0"` tag are
/// skipped; a failing or panicking handler turns into an internal-error
/// response. Only end of input (or a failure to read input or write a
/// response) ends the loop.
pub fn serve<R, H, S>(mut reader: R, handler: &mut H, sink: &mut S) -> io::Result<ServeStats>
where
    R: BufRead,
    H: Handler + ?Sized,
    S: ResponseSink + ?Sized,
{
    let mut stats = ServeStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        stats.received += 1;
        debug!(line = %clip(line), "received");

        let request = match Envelope::from_line(line) {
            Ok(request) => request,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %clip(&message), "JSON parse error, skipping line");
                stats.skipped += 1;
                continue;
            }
        };
        if !request.has_valid_tag() {
            debug!(tag = %clip(&request.jsonrpc), "missing or wrong jsonrpc tag, skipping line");
            stats.skipped += 1;
            continue;
        }

        if let Some(response) = dispatch_guarded(handler, request) {
            sink.send_response(&response)?;
            stats.responded += 1;
        }
    }

    info!(
        received = stats.received,
        responded = stats.responded,
        skipped = stats.skipped,
        "input closed"
    );
    Ok(stats)
}

fn dispatch_guarded<H: Handler + ?Sized>(handler: &mut H, request: Envelope) -> Option<Envelope> {
    let id = request.id.clone();
    let method = request.method().to_string();
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
        Ok(response) => response,
        Err(_) => {
            error!(method = %clip(&method), "handler panicked");
            id.map(|id| {
                Envelope::failure(
                    id,
                    ErrorObject::internal(format!("Error processing request: {method}")),
                )
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, StdioSink};
    use protocol::RequestId;
    use serde_json::json;

    /// Echoes params back as the result; panics on `boom`.
    struct Echo;

    impl Handler for Echo {
        fn handle(&mut self, request: Envelope) -> Option<Envelope> {
            if request.method() == "boom" {
                panic!("boom");
            }
            let id = request.id?;
            Some(Envelope::success(id, request.params.unwrap_or_default()))
        }
    }

    fn run(input: &str) -> (ServeStats, Vec<Envelope>) {
        let mut sink = MemorySink::default();
        let stats = serve(input.as_bytes(), &mut Echo, &mut sink).unwrap();
        (stats, sink.responses)
    }

    #[test]
    fn response_id_matches_request_id() {
        let (_, responses) = run(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"a","params":{"n":1}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"two","method":"b"}"#,
            "\n",
        ));
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, Some(RequestId::Number(1)));
        assert_eq!(responses[0].result, Some(json!({"n": 1})));
        assert_eq!(responses[1].id, Some(RequestId::from("two")));
    }

    #[test]
    fn notifications_write_no_bytes() {
        let mut sink = StdioSink::new(Vec::new());
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"tools/list","params":{}}"#,
            "\n",
        );
        let stats = serve(input.as_bytes(), &mut Echo, &mut sink).unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.responded, 0);
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn garbage_is_skipped_and_loop_continues() {
        let (stats, responses) = run(concat!(
            "\n",
            "   \n",
            "not json at all\n",
            "{\"jsonrpc\":\"2.0\",\"id\":1,\n",
            r#"{"id":2,"method":"untagged"}"#,
            "\n",
            r#"{"jsonrpc":"1.0","id":3,"method":"old"}"#,
            "\n",
            "\u{fffd}\u{0}binary\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"ok"}"#,
            "\n",
        ));
        assert_eq!(stats.skipped, 5);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, Some(RequestId::Number(4)));
    }

    #[test]
    fn invalid_utf8_is_skipped() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ok"}"#);
        input.push(b'\n');
        let mut sink = MemorySink::default();
        let stats = serve(&input[..], &mut Echo, &mut sink).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(sink.responses.len(), 1);
    }

    #[test]
    fn last_line_without_newline_is_served() {
        let (_, responses) = run(r#"{"jsonrpc":"2.0","id":1,"method":"a"}"#);
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn panicking_handler_becomes_internal_error() {
        let (_, responses) = run(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"boom"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"boom"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"fine"}"#,
            "\n",
        ));
        assert_eq!(responses.len(), 2);
        let err = responses[0].error.as_ref().unwrap();
        assert_eq!(err.code, protocol::codes::INTERNAL_ERROR);
        assert_eq!(responses[1].id, Some(RequestId::Number(2)));
    }
}

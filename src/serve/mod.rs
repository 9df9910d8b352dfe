//! Line-delimited JSON request loop
//!
//! Reads requests from `input` and handles each line on its own thread, so
//! many callers reach the dispatcher concurrently. Responses are written as
//! whole lines under the output lock, in completion order. At end of input
//! the loop waits for in-flight requests, then shuts the dispatcher down.

mod handler;
mod protocol;

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;

pub use handler::handle;
pub use protocol::{
    Request, Response, ResponseError, INVALID_PARAMS, INVALID_REQUEST, OPS, UNKNOWN_OP,
};

/// Counters for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Lines that produced a response
    pub requests: usize,
    /// Lines rejected as `INVALID_REQUEST`
    pub invalid: usize,
}

/// Run the loop until `input` is exhausted.
pub fn serve<R, W>(dispatcher: &Dispatcher, input: R, output: &Mutex<W>) -> io::Result<ServeStats>
where
    R: BufRead,
    W: Write + Send,
{
    let requests = AtomicUsize::new(0);
    let invalid = AtomicUsize::new(0);
    info!("request loop started");

    let read_result = thread::scope(|scope| -> io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            requests.fetch_add(1, Ordering::Relaxed);

            let request = match Request::parse(&line) {
                Ok(request) => request,
                Err(e) => {
                    invalid.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "malformed request line");
                    let response = Response::failure(Value::Null, INVALID_REQUEST, e.to_string());
                    write_response(output, &response);
                    continue;
                }
            };

            scope.spawn(move || {
                debug!(op = %request.op, id = %request.id, "request received");
                let response = handle(dispatcher, request);
                write_response(output, &response);
            });
        }
        Ok(())
    });

    // In-flight requests have all finished once the scope returns.
    dispatcher.shutdown();

    let stats = ServeStats {
        requests: requests.into_inner(),
        invalid: invalid.into_inner(),
    };
    info!(requests = stats.requests, invalid = stats.invalid, "request loop stopped");
    read_result.map(|_| stats)
}

fn write_response<W: Write>(output: &Mutex<W>, response: &Response) {
    let line = response.to_line();
    let mut out = output.lock();
    if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
        warn!(error = %e, "failed to write response");
    }
}

//! Reading the response back to the engine.
//!
//! The first read after a send returns the reconstructed header block
//! followed by as much body as fits. Later reads return body only. A read
//! failure after some bytes were already copied is held back and reported by
//! the next read, so the caller never loses data it was given.

use soapwire_core::{
    BUFFER_GROWTH_STEP, ContentKindTracker, GrowableBuffer, raw_header_lines,
    reconstruct_header_block,
};

use crate::diagnostics::DiagnosticLog;
use crate::error::TransportError;
use crate::network::{HeaderQuery, HeaderQueryResult, NetworkLayer};
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Nothing was sent.
    Idle,
    /// A response arrived; its headers were not delivered yet.
    Headers,
    Body,
}

#[derive(Debug)]
pub(crate) struct ResponseReader {
    phase: Phase,
    pending_error: Option<TransportError>,
}

impl Default for ResponseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseReader {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            pending_error: None,
        }
    }

    /// No response to read.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.pending_error = None;
    }

    /// A send finished; the next read starts with the header block.
    pub(crate) fn response_ready(&mut self) {
        self.phase = Phase::Headers;
        self.pending_error = None;
    }

    /// Fill `out` with the next part of the response. `Ok(0)` is end of body.
    ///
    /// `scratch` holds the raw header block while it is reconstructed.
    pub(crate) fn read<N: NetworkLayer>(
        &mut self,
        network: &N,
        session: &mut Session<N>,
        scratch: &mut GrowableBuffer,
        tracker: &mut ContentKindTracker,
        diag: &mut DiagnosticLog,
        out: &mut [u8],
    ) -> Result<usize, TransportError> {
        if let Some(err) = self.pending_error.take() {
            diag.line(format_args!("recv: reporting deferred error: {err}"));
            return Err(err);
        }
        if self.phase == Phase::Idle {
            diag.line(format_args!("recv: no request to read from"));
            return Err(TransportError::NoRequest);
        }
        let request = session.request_mut().ok_or(TransportError::NoRequest)?;

        let mut total = 0;
        if self.phase == Phase::Headers {
            total = deliver_headers(network, request, scratch, tracker, diag, out)?;
            self.phase = Phase::Body;
        }

        let body_start = total;
        while total < out.len() {
            match network.read(request, &mut out[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    diag.line(format_args!("recv: error {} ({}) in read", e.code, e.message));
                    if total == 0 {
                        return Err(e.into());
                    }
                    self.pending_error = Some(e.into());
                    break;
                }
            }
        }

        if total > body_start {
            diag.data("recv: message data", &out[body_start..total], tracker.kind());
        }
        diag.line(format_args!("recv: returning {total} bytes"));
        Ok(total)
    }
}

fn deliver_headers<N: NetworkLayer>(
    network: &N,
    request: &mut N::Request,
    scratch: &mut GrowableBuffer,
    tracker: &mut ContentKindTracker,
    diag: &mut DiagnosticLog,
    out: &mut [u8],
) -> Result<usize, TransportError> {
    scratch.ensure(BUFFER_GROWTH_STEP)?;
    let raw_len = loop {
        match network.query_headers(request, HeaderQuery::Response, scratch.as_mut_slice()) {
            Ok(HeaderQueryResult::Written(n)) => break n,
            Ok(HeaderQueryResult::NeedsCapacity(n)) if n > scratch.capacity() => {
                scratch.ensure(n)?;
            }
            Ok(HeaderQueryResult::NeedsCapacity(n)) => {
                return Err(TransportError::Protocol(format!(
                    "network layer asked for {n} bytes of header space but {} were offered",
                    scratch.capacity()
                )));
            }
            Err(e) => {
                diag.line(format_args!(
                    "recv: error {} ({}) querying response headers",
                    e.code, e.message
                ));
                return Err(e.into());
            }
        }
    };

    let raw = scratch.prefix(raw_len);
    // the response body is described by its own headers
    tracker.reset();
    diag.line(format_args!("recv: response headers:"));
    for line in raw_header_lines(raw) {
        diag.line(format_args!("  {}", String::from_utf8_lossy(line)));
        tracker.observe_line(line);
    }

    let written = reconstruct_header_block(raw, out)?;
    Ok(written)
}

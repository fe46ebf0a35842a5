//! Response sink handed to handlers.
//!
//! Handlers write into a [`ResponseWriter`] instead of returning a response
//! value. This lets middleware set headers before the handler runs and lets
//! the error renderer take over when the handler fails before writing.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::Metrics;
use crate::scope::{CloseFuture, CloseNotifier};

/// Buffered response: status, headers and body.
///
/// The first [`write_header`](Self::write_header) wins; writing body bytes
/// without a status implies `200 OK`.
pub struct ResponseWriter {
    status: Option<u16>,
    headers: HeaderMap,
    body: Vec<u8>,
    started: Instant,
    closed: Option<CancellationToken>,
    metrics: Option<Arc<Metrics>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            started: Instant::now(),
            closed: None,
            metrics: None,
        }
    }

    /// Attaches the connection's close signal. The transport cancels `closed`
    /// when the client disconnects before the response is sent.
    pub fn with_close_signal(mut self, closed: CancellationToken) -> Self {
        self.closed = Some(closed);
        self
    }

    /// Counts this response in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// `true` once a status has been written.
    pub fn is_started(&self) -> bool {
        self.status.is_some()
    }

    /// Sets the response status. Only the first call has an effect.
    pub fn write_header(&mut self, status: u16) {
        if let Some(prev) = self.status {
            warn!(prev, ignored = status, "superfluous write_header call");
            return;
        }
        self.status = Some(status);
        if let Some(metrics) = &self.metrics {
            metrics.record_status(sendable(status).as_u16());
        }
    }

    /// Appends to the body, writing `200 OK` first if no status was set.
    pub fn write(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.write_header(StatusCode::OK.as_u16());
        }
        self.body.extend_from_slice(chunk);
    }

    /// Writes a complete `text/plain` response.
    pub fn text(&mut self, status: StatusCode, body: impl AsRef<str>) {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.write_header(status.as_u16());
        self.write(body.as_ref().as_bytes());
    }

    /// Writes a complete `application/json` response from serialised bytes.
    pub fn json(&mut self, status: StatusCode, body: &[u8]) {
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.write_header(status.as_u16());
        self.write(body);
    }

    /// Records how long the request took. Called once by the transport.
    pub fn finish(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_duration(self.started.elapsed());
        }
    }

    /// Converts the buffered response for hyper.
    ///
    /// A response nobody wrote to becomes an empty `200 OK`. Status values
    /// outside `100..=999` cannot be sent and are replaced with `500`.
    pub fn into_response(mut self) -> http::Response<Full<Bytes>> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK.as_u16());
        }
        let raw = self.status.unwrap_or(200);
        let status = sendable(raw);
        if status.as_u16() != raw {
            warn!(status = raw, "invalid status code, sending 500");
        }

        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

// The status that actually goes on the wire for `raw`.
fn sendable(raw: u16) -> StatusCode {
    StatusCode::from_u16(raw).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CloseNotifier for ResponseWriter {
    fn close_notify(&self) -> Option<CloseFuture> {
        let closed = self.closed.clone()?;
        Some(Box::pin(closed.cancelled_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_header_wins() {
        let mut w = ResponseWriter::new();
        w.write_header(404);
        w.write_header(200);
        w.write(b"gone");
        assert_eq!(w.status(), Some(404));
        assert_eq!(w.body(), b"gone");
    }

    #[test]
    fn write_implies_ok() {
        let mut w = ResponseWriter::new();
        assert!(!w.is_started());
        w.write(b"hi");
        assert!(w.is_started());
        assert_eq!(w.status(), Some(200));
    }

    #[test]
    fn invalid_status_becomes_500() {
        let mut w = ResponseWriter::new();
        w.write_header(3);
        assert_eq!(w.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_status_is_counted_as_sent() {
        let metrics = Arc::new(Metrics::new());
        let mut w = ResponseWriter::new().with_metrics(Arc::clone(&metrics));
        w.write_header(3);
        assert_eq!(w.status(), Some(3));

        let snap = metrics.snapshot();
        assert_eq!(snap.responses["500"], 1);
        assert!(!snap.responses.contains_key("3"));
        assert_eq!(snap.errors["500"], 1);
    }

    #[test]
    fn untouched_writer_is_empty_ok() {
        let response = ResponseWriter::new().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn records_metrics() {
        let metrics = Arc::new(Metrics::new());
        let mut w = ResponseWriter::new().with_metrics(Arc::clone(&metrics));
        w.text(StatusCode::BAD_REQUEST, "bad");
        w.finish();

        let snap = metrics.snapshot();
        assert_eq!(snap.responses["400"], 1);
        assert_eq!(snap.errors["400"], 1);
        assert_eq!(snap.duration.values().sum::<u64>(), 1);
        assert_eq!(w.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn close_notify_follows_signal() {
        assert!(ResponseWriter::new().close_notify().is_none());

        let closed = CancellationToken::new();
        let w = ResponseWriter::new().with_close_signal(closed.clone());
        let notified = w.close_notify().expect("close signal attached");
        closed.cancel();
        notified.await;
    }
}

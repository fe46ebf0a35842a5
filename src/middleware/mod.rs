//! Built-in middleware.
//!
//! Middleware is the right place for cross-cutting concerns: structured
//! tracing, deadlines, request-id injection, authentication-header checks.
//! Each function here has the shape `Fn(BoxedHandler) -> BoxedHandler` and
//! goes straight into [`Stack::with`](crate::Stack::with).
//!
//! - [`trace`]: per-request span with method and path; logs status and latency
//! - [`timeout`]: gives the wrapped handlers a deadline scope
//! - [`seed`]: runs the wrapped handlers in a child of a long-lived scope

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, info, info_span, warn};

use crate::handler::{BoxedHandler, Handler, handler_fn};
use crate::scope::Scope;

/// Per-request `tracing` span.
///
/// Successful requests are logged at `INFO` with the status the handler
/// wrote; failed ones at `WARN` with the error, its would-be status and the
/// request's diagnostic fields.
pub fn trace(next: BoxedHandler) -> BoxedHandler {
    handler_fn(move |cx, w, req| {
        let next = Arc::clone(&next);
        let span = info_span!("request", method = %req.method(), path = req.path());
        Box::pin(
            async move {
                let started = Instant::now();
                let fields = cx.fields().clone();
                let result = next.serve(cx, w, req).await;
                let latency = started.elapsed();
                match &result {
                    Ok(()) => info!(status = w.status().unwrap_or(200), ?latency, "request finished"),
                    Err(err) => warn!(
                        status = err.status_code().unwrap_or(500),
                        error = %err,
                        %fields,
                        ?latency,
                        "request failed"
                    ),
                }
                result
            }
            .instrument(span),
        )
    })
    .boxed()
}

/// Cancels the scope seen by the wrapped handlers after `deadline`.
///
/// Cancellation is cooperative: handlers that never look at their scope run
/// to completion regardless.
pub fn timeout(deadline: Duration) -> impl Fn(BoxedHandler) -> BoxedHandler + Clone + Send + Sync {
    move |next: BoxedHandler| {
        handler_fn(move |cx, w, req| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                let (scope, release) = cx.scope().with_timeout(deadline);
                let result = next.serve(cx.with_scope(scope), w, req).await;
                release.release();
                result
            })
        })
        .boxed()
    }
}

/// Runs `next` in a fresh per-request child of `base`, watching the
/// connection for an early close.
///
/// The incoming scope is replaced, not nested: requests served through a
/// seeded stack answer to `base`, whatever the transport's own parent is.
/// Diagnostic fields are kept.
pub fn seed(base: Scope, next: BoxedHandler) -> BoxedHandler {
    handler_fn(move |cx, w, req| {
        let next = Arc::clone(&next);
        let (scope, release) = Scope::for_request(Some(&base), Some(&*w));
        Box::pin(async move {
            let result = next.serve(cx.with_scope(scope), w, req).await;
            release.release();
            result
        })
    })
    .boxed()
}

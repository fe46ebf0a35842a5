//! Dispatch entry point.
//!
//! An [`Endpoint`] is what the transport calls once per request. It owns the
//! request's scope for the duration of the call:
//!
//! 1. create the scope (child of the configured parent, watching the
//!    connection for an early close);
//! 2. run the composed handler;
//! 3. on failure, render the error unless the handler already wrote a
//!    status;
//! 4. release the scope, on every exit path.

use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Context, Handler};
use crate::render::render;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::scope::Scope;

/// A composed handler ready to be served.
#[derive(Clone)]
pub struct Endpoint {
    handler: BoxedHandler,
    parent: Option<Scope>,
}

impl Endpoint {
    pub fn new(handler: impl Handler) -> Self {
        Self { handler: handler.boxed(), parent: None }
    }

    /// Makes every request scope a child of `parent`.
    pub fn with_parent(mut self, parent: Scope) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Runs one request.
    ///
    /// Returns once the response is complete in `w`: written by the handler
    /// on success, rendered from the error on failure.
    pub async fn serve(&self, w: &mut ResponseWriter, req: &Request) {
        let (scope, release) = Scope::for_request(self.parent.as_ref(), Some(&*w));
        let cx = Context::new(scope)
            .with_field("method", req.method())
            .with_field("path", req.path());

        let result = self.handler.serve(cx, w, req).await;
        release.release();

        if let Err(err) = result {
            fail(w, req, &err);
        }
    }
}

fn fail(w: &mut ResponseWriter, req: &Request, err: &Error) {
    // The status and body are already committed; rendering would append to
    // them and contradict the headers.
    if w.is_started() {
        warn!(
            error = %err,
            status = w.status(),
            method = %req.method(),
            path = req.path(),
            "handler failed after writing a response"
        );
        return;
    }
    debug!(error = %err, method = %req.method(), path = req.path(), "rendering handler error");
    render(w, req, err);
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("parent", &self.parent).finish_non_exhaustive()
    }
}

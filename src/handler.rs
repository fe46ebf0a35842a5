//! Handler trait, function adapter and type erasure.
//!
//! # Shape of a handler
//!
//! A handler receives three things and returns `Result<(), Error>`:
//!
//! ```text
//! cx:  Context               ← scope (cancellation) + diagnostic fields
//! w:   &mut ResponseWriter   ← where the response goes
//! req: &Request              ← the buffered request
//! ```
//!
//! On `Ok(())` the handler has written its response. On `Err(e)` nothing
//! should have been written yet; the dispatch layer renders `e`.
//!
//! # Storing handlers
//!
//! Middleware stacks wrap handlers of different concrete types inside each
//! other, so everything is erased to [`BoxedHandler`] (`Arc<dyn Handler>`).
//! The per-request cost is one virtual call and one boxed future per layer.
//!
//! ```rust
//! use strata::{handler_fn, Handler};
//! use http::StatusCode;
//!
//! let hello = handler_fn(|_cx, w, _req| Box::pin(async move {
//!     w.text(StatusCode::OK, "hello");
//!     Ok(())
//! }));
//! # let _ = hello.boxed();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::fields::Fields;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::scope::Scope;

// ── Context ───────────────────────────────────────────────────────────────────

/// Per-request values passed down the middleware stack.
///
/// The cancellation [`Scope`] and the diagnostic [`Fields`] are independent:
/// replacing one never touches the other.
#[derive(Clone, Debug, Default)]
pub struct Context {
    scope: Scope,
    fields: Fields,
}

impl Context {
    pub fn new(scope: Scope) -> Self {
        Self { scope, fields: Fields::new() }
    }

    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn fields(&self) -> &Fields { &self.fields }

    /// Same fields, different scope. Used by middleware that derives a
    /// narrower scope (deadline, seeded parent) for the handlers it wraps.
    pub fn with_scope(self, scope: Scope) -> Self {
        Self { scope, fields: self.fields }
    }

    /// Same scope, one more diagnostic field.
    pub fn with_field(self, key: &'static str, value: impl std::fmt::Display) -> Self {
        Self { fields: self.fields.with(key, value), scope: self.scope }
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// The future returned by [`Handler::serve`]. Borrows the writer and request
/// for `'a`.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Something that can process one request.
///
/// Implement it on your own types, or adapt a closure with [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(
        &'a self,
        cx: Context,
        w: &'a mut ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a>;

    /// Erases the concrete type.
    fn boxed(self) -> BoxedHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(
        &'a self,
        cx: Context,
        w: &'a mut ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        (**self).serve(cx, w, req)
    }
}

// ── Function adapter ──────────────────────────────────────────────────────────

/// Adapts a function or closure into a [`Handler`]. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Adapts `f` into a [`Handler`].
///
/// The closure must return its future boxed, because the future borrows the
/// writer and request:
///
/// ```rust
/// use strata::{handler_fn, Error};
///
/// let forbidden = handler_fn(|_cx, _w, req| Box::pin(async move {
///     Err(Error::forbidden(format!("no access to {}", req.path())))
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, &'a Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(
        &'a self,
        cx: Context,
        w: &'a mut ResponseWriter,
        req: &'a Request,
    ) -> BoxFuture<'a> {
        (self.0)(cx, w, req)
    }
}

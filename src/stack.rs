//! Middleware stacks.
//!
//! A middleware is a function from [`BoxedHandler`] to [`BoxedHandler`]. A
//! [`Stack`] is an immutable, singly-linked list of middleware: each
//! [`with`](Stack::with) returns a new stack that shares its tail with the
//! stack it was called on. Build stacks once at startup and branch freely:
//!
//! ```rust
//! use strata::{middleware, Stack};
//!
//! let public = Stack::new().with(middleware::trace);
//! let admin = public.with(|next| next); // `public` is unchanged
//! # let _ = admin;
//! ```
//!
//! [`handle`](Stack::handle) wraps a terminal handler so that the first
//! middleware added is the outermost layer: it runs first on the way in and
//! last on the way out.

use std::fmt;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware;
use crate::scope::Scope;

/// A transform from one handler to another.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, next: BoxedHandler) -> BoxedHandler {
        (self.0)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

struct Node {
    middleware: Middleware,
    previous: Option<Arc<Node>>,
}

/// An ordered, immutable list of middleware.
///
/// Cloning is one reference-count increment. Stacks are `Send + Sync` and can
/// be shared by any number of servers and requests.
#[derive(Clone, Default)]
pub struct Stack {
    head: Option<Arc<Node>>,
}

impl Stack {
    /// The empty stack. Handlers built from it run with whatever scope the
    /// dispatch entry point creates.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack whose outermost layer runs every request in a child of `base`.
    ///
    /// Cancelling `base` (for example on shutdown) cancels all in-flight
    /// requests built from this stack or any stack derived from it.
    pub fn seeded(base: Scope) -> Self {
        Self::new().push(Middleware::new(move |next| middleware::seed(base.clone(), next)))
    }

    /// Returns a new stack with `f` added inside every middleware already on
    /// `self`.
    pub fn with<F>(&self, f: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        self.push(Middleware::new(f))
    }

    /// Returns a new stack with each present middleware added in order.
    /// `None` entries are skipped.
    pub fn extend<I>(&self, middleware: I) -> Self
    where
        I: IntoIterator<Item = Option<Middleware>>,
    {
        middleware.into_iter().flatten().fold(self.clone(), |stack, m| stack.push(m))
    }

    fn push(&self, middleware: Middleware) -> Self {
        Self {
            head: Some(Arc::new(Node { middleware, previous: self.head.clone() })),
        }
    }

    /// Number of middleware on the stack.
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Most recently added first.
    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |node| node.previous.as_deref())
    }

    /// Wraps `handler` in every middleware on the stack.
    ///
    /// Walks from the most recently added middleware to the first one, so the
    /// first one ends up outermost. Pure: nothing runs until a request does.
    pub fn handle(&self, handler: impl Handler) -> BoxedHandler {
        self.nodes().fold(handler.boxed(), |inner, node| node.middleware.apply(inner))
    }

    /// [`handle`](Self::handle) followed by the dispatch entry point.
    pub fn endpoint(&self, handler: impl Handler) -> Endpoint {
        Endpoint::new(self.handle(handler))
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack").field("len", &self.len()).finish()
    }
}

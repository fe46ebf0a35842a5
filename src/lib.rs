//! # strata
//!
//! Request scopes, middleware stacks and error rendering for hyper services.
//!
//! ## The contract
//!
//! Every request gets three things:
//!
//! - a **scope**: a cancellation signal that fires when the request is done,
//!   when the client hangs up early, or when a deadline or shutdown says so;
//! - a **stack** of middleware around the handler, first-added outermost;
//! - **error rendering**: handlers return `Err(e)` and the client gets a
//!   status code plus a JSON envelope or a plain-text message.
//!
//! Routing, TLS and body limits are not here. Put a router inside a handler
//! and nginx in front of the server.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{handler_fn, middleware, Error, Server, Stack};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let stack = Stack::new().with(middleware::trace);
//!
//!     let app = stack.endpoint(handler_fn(|cx, w, req| Box::pin(async move {
//!         if req.path() != "/" {
//!             return Err(Error::not_found("no such page"));
//!         }
//!         if cx.scope().is_cancelled() {
//!             return Ok(());
//!         }
//!         w.text(StatusCode::OK, "hello");
//!         Ok(())
//!     })));
//!
//!     Server::bind("0.0.0.0:3000").unwrap().serve(app).await.unwrap();
//! }
//! ```

mod endpoint;
mod error;
mod fields;
mod handler;
mod metrics;
mod render;
mod request;
mod response;
mod scope;
mod server;
mod stack;

pub mod middleware;

pub use endpoint::Endpoint;
pub use error::{Error, HasErrorCode, HasStatusCode};
pub use fields::Fields;
pub use handler::{BoxFuture, BoxedHandler, Context, Handler, HandlerFn, handler_fn};
pub use metrics::{Metrics, Snapshot};
pub use render::{render, wants_json};
pub use request::Request;
pub use response::ResponseWriter;
pub use scope::{CloseFuture, CloseNotifier, Release, Scope};
pub use server::{ServeError, Server};
pub use stack::{Middleware, Stack};

//! Request-scoped cancellation.
//!
//! Every request runs inside a [`Scope`]. The scope's done-signal fires when
//! the owner calls [`Release::release`] (or drops the [`Release`]), when a
//! parent scope is cancelled, or when the transport reports that the client
//! closed the connection before the response was finished.
//!
//! Cancellation is cooperative. Nothing preempts a running handler: handlers
//! that do long work should await [`Scope::cancelled`] alongside it, or use
//! [`Scope::run_until_cancelled`].
//!
//! ```rust
//! use strata::Scope;
//!
//! let (scope, release) = Scope::for_request(None, None);
//! assert!(!scope.is_cancelled());
//!
//! release.release();
//! release.release(); // idempotent
//! assert!(scope.is_cancelled());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

/// A future that resolves once the underlying connection has closed.
pub type CloseFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Capability of a response sink (or any transport object) to report that the
/// client went away.
///
/// `close_notify` is called exactly once per scope, synchronously, before any
/// watcher task is spawned. Transports that invalidate their notification
/// channel after the request completes are therefore never queried late.
pub trait CloseNotifier {
    /// Returns a future that resolves when the connection closes, or `None`
    /// if this transport cannot report disconnects.
    fn close_notify(&self) -> Option<CloseFuture>;
}

/// A cancellable execution scope bound to one request.
///
/// Cloning a `Scope` yields another handle to the same done-signal; it does
/// not create a new scope. Only the matching [`Release`] can cancel it.
#[derive(Clone, Debug)]
pub struct Scope {
    token: CancellationToken,
}

impl Scope {
    /// A scope that is never cancelled. Used when no parent is supplied.
    pub fn root() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// Creates the scope for one request.
    ///
    /// The scope is a child of `parent` (or of a fresh root scope). If `conn`
    /// can report disconnects, a watcher task waits for whichever comes first:
    /// the close notification, which cancels the scope, or the scope's own
    /// done-signal, which ends the watcher. Releasing the scope therefore never
    /// leaks the watcher.
    ///
    /// The caller must release the returned [`Release`] when the request is
    /// finished. Dropping it has the same effect.
    pub fn for_request(
        parent: Option<&Scope>,
        conn: Option<&dyn CloseNotifier>,
    ) -> (Scope, Release) {
        let token = match parent {
            Some(parent) => parent.token.child_token(),
            None => CancellationToken::new(),
        };

        // Acquire before spawning, see `CloseNotifier`.
        let closed = conn.and_then(|c| c.close_notify());

        if let Some(closed) = closed {
            match Handle::try_current() {
                Ok(rt) => {
                    let watched = token.clone();
                    rt.spawn(async move {
                        tokio::select! {
                            () = closed => {
                                debug!("connection closed early, cancelling request scope");
                                watched.cancel();
                            }
                            () = watched.cancelled() => {}
                        }
                    });
                }
                Err(_) => debug!("no tokio runtime, close notification ignored"),
            }
        }

        (Scope { token: token.clone() }, Release { token })
    }

    /// Derives a child scope that is cancelled with this one, or earlier
    /// through its own [`Release`].
    pub fn child(&self) -> (Scope, Release) {
        let token = self.token.child_token();
        (Scope { token: token.clone() }, Release { token })
    }

    /// Derives a child scope that is additionally cancelled once `deadline`
    /// has elapsed.
    ///
    /// The timer task ends as soon as the child scope is done. Outside a tokio
    /// runtime no timer can be armed and the child behaves like [`Scope::child`].
    pub fn with_timeout(&self, deadline: Duration) -> (Scope, Release) {
        let (scope, release) = self.child();

        match Handle::try_current() {
            Ok(rt) => {
                let watched = scope.token.clone();
                rt.spawn(async move {
                    tokio::select! {
                        () = tokio::time::sleep(deadline) => {
                            debug!(?deadline, "request deadline elapsed");
                            watched.cancel();
                        }
                        () = watched.cancelled() => {}
                    }
                });
            }
            Err(_) => debug!(?deadline, "no tokio runtime, deadline not armed"),
        }

        (scope, release)
    }

    /// Returns `true` once the done-signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the done-signal.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// An owned, `'static` future for the done-signal, suitable for moving
    /// into spawned tasks.
    pub fn done(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Runs `fut` to completion unless the scope is cancelled first, in which
    /// case `fut` is dropped and `None` is returned.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

/// The owner's handle for ending a [`Scope`].
///
/// Releasing is idempotent: the done-signal fires once, on the first call.
/// Dropping a `Release` releases the scope, so binding it to a local gives
/// `defer`-style cleanup on every exit path.
#[must_use = "dropping a Release cancels its scope immediately"]
#[derive(Debug)]
pub struct Release {
    token: CancellationToken,
}

impl Release {
    /// Fires the scope's done-signal. Further calls are no-ops.
    pub fn release(&self) {
        self.token.cancel();
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

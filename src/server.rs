//! HTTP server and graceful shutdown.
//!
//! # Per-request flow
//!
//! For every request hyper hands us, the server
//! 1. buffers the body and builds a [`Request`];
//! 2. spawns a task that runs the [`Endpoint`] against a fresh
//!    [`ResponseWriter`];
//! 3. waits for that task and converts the writer into the hyper response.
//!
//! If the client disconnects first, hyper drops the future from step 3. A
//! drop guard then fires the writer's close signal, which cancels the
//! request's scope. The handler task keeps running until it notices, so
//! nothing is torn down mid-write.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`; no new connections are made.
//! 2. Cancelling the server's base scope, so handlers that watch their scope
//!    can wrap up early.
//! 3. Asking idle keep-alive connections to close and letting every
//!    in-flight request run to completion.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::endpoint::Endpoint;
use crate::metrics::Metrics;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::scope::{Release, Scope};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Infrastructure failures: a bad listen address, or an I/O error while
/// binding.
///
/// Request-level failures never surface here; they are rendered into
/// responses.
#[derive(Debug)]
pub enum ServeError {
    Addr(std::net::AddrParseError),
    Io(std::io::Error),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(e) => write!(f, "invalid listen address: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Addr(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ServeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<std::net::AddrParseError> for ServeError {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::Addr(e)
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    scope: Scope,
    release: Release,
    metrics: Option<Arc<Metrics>>,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called.
    ///
    /// ```rust
    /// use strata::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, ServeError> {
        let addr: SocketAddr = addr.parse()?;
        let (scope, release) = Scope::root().child();
        Ok(Self { addr, scope, release, metrics: None })
    }

    /// Derives the server's base scope from `parent`. Every request scope is
    /// a descendant of it; cancelling `parent` cancels them all.
    pub fn scope(mut self, parent: &Scope) -> Self {
        let (scope, release) = parent.child();
        self.scope = scope;
        self.release = release;
        self
    }

    /// Counts responses in `metrics`.
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Starts accepting connections and dispatching them to `endpoint`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, endpoint: Endpoint) -> Result<(), ServeError> {
        self.serve_with_shutdown(endpoint, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, endpoint: Endpoint, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.run(listener, endpoint, signal).await
    }

    /// Serves on an already-bound listener. The configured address is
    /// ignored.
    pub async fn serve_listener<F>(
        self,
        listener: TcpListener,
        endpoint: Endpoint,
        signal: F,
    ) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send,
    {
        self.run(listener, endpoint, signal).await
    }

    async fn run<F>(self, listener: TcpListener, endpoint: Endpoint, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { scope, release, metrics, .. } = self;
        let addr = listener.local_addr()?;

        // Shared by every connection task; requests run in children of `scope`.
        let endpoint = Arc::new(endpoint.with_parent(scope));

        info!(%addr, "strata listening");

        let builder = ConnBuilder::new(TokioExecutor::new());
        // Tells idle keep-alive connections to close once shutdown starts.
        let graceful = GracefulShutdown::new();
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let endpoint = Arc::clone(&endpoint);
                    let metrics = metrics.clone();
                    let io = TokioIo::new(stream);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        dispatch(Arc::clone(&endpoint), metrics.clone(), req)
                    });
                    let conn = graceful.watch(builder.serve_connection_with_upgrades(io, svc).into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // In-flight handlers learn about the shutdown through their scopes.
        release.release();

        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}

        info!("strata stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request and produces one response.
///
/// The error type is [`Infallible`]: every failure becomes a response, so
/// hyper never sees an error.
async fn dispatch(
    endpoint: Arc<Endpoint>,
    metrics: Option<Arc<Metrics>>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Ok(plain_status(StatusCode::BAD_REQUEST));
        }
    };
    let request = Request::from_parts(parts, body);

    // Fires if hyper drops this future before the handler task finishes,
    // which is how a client disconnect shows up here.
    let closed = CancellationToken::new();
    let on_disconnect = closed.clone().drop_guard();

    let mut writer = ResponseWriter::new().with_close_signal(closed);
    if let Some(metrics) = metrics {
        writer = writer.with_metrics(metrics);
    }

    let task = tokio::spawn(async move {
        endpoint.serve(&mut writer, &request).await;
        writer
    });

    let joined = task.await;
    let _ = on_disconnect.disarm();

    match joined {
        Ok(writer) => {
            writer.finish();
            Ok(writer.into_response())
        }
        Err(e) => {
            error!(error = %e, "handler task failed");
            Ok(plain_status(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn plain_status(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut writer = ResponseWriter::new();
    writer.text(status, status.canonical_reason().unwrap_or_default());
    writer.into_response()
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. If a handler cannot be installed the
/// error is logged and that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

//! Minimal strata example: a public stack around every request, an extra
//! layer nested inside it for admin pages, and errors rendered as JSON for
//! `/api/` paths.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/admin
//!   curl -H 'authorization: Bearer letmein' http://localhost:3000/admin
//!   curl http://localhost:3000/api/missing
//!   curl http://localhost:3000/slow        # then Ctrl-C the curl

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use strata::{BoxedHandler, Error, Handler, Metrics, Server, Stack, handler_fn, middleware};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let public = Stack::new()
        .with(middleware::trace)
        .with(middleware::timeout(Duration::from_secs(10)));
    // Runs inside `public`, so only the extra layer goes here.
    let admin = Stack::new().with(require_token);

    let admin_page = admin.handle(handler_fn(|cx, w, _req| {
        Box::pin(async move {
            let user = cx.fields().get("user").unwrap_or("unknown").to_owned();
            w.text(StatusCode::OK, format!("admin page, user={user}"));
            Ok(())
        })
    }));

    let app = public.endpoint(handler_fn(move |cx, w, req| {
        let admin_page = Arc::clone(&admin_page);
        Box::pin(async move {
            match req.path() {
                "/" => {
                    w.text(StatusCode::OK, "index page");
                    Ok(())
                }
                "/admin" => admin_page.serve(cx, w, req).await,
                "/slow" => {
                    let work = tokio::time::sleep(Duration::from_secs(30));
                    if cx.scope().run_until_cancelled(work).await.is_none() {
                        tracing::info!("client went away, abandoning slow work");
                        return Ok(());
                    }
                    w.text(StatusCode::OK, "done");
                    Ok(())
                }
                _ => Err(Error::not_found("no such page").code_as("E_NOT_FOUND")),
            }
        })
    }));

    let metrics = Arc::new(Metrics::new());
    let server = match Server::bind("0.0.0.0:3000") {
        Ok(server) => server.metrics(Arc::clone(&metrics)),
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };

    if let Err(e) = server.serve(app).await {
        tracing::error!("server error: {e}");
    }
    tracing::info!(?metrics, "final counters");
}

// Middleware that rejects requests without the demo bearer token and records
// the caller for handlers further in.
fn require_token(next: BoxedHandler) -> BoxedHandler {
    handler_fn(move |cx, w, req| {
        let next = Arc::clone(&next);
        Box::pin(async move {
            if req.header("authorization") != Some("Bearer letmein") {
                return Err(Error::new("missing or bad token", StatusCode::UNAUTHORIZED));
            }
            next.serve(cx.with_field("user", "admin"), w, req).await
        })
    })
    .boxed()
}

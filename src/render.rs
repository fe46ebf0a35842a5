//! Error-to-response rendering.
//!
//! [`render`] is the single place where a handler's [`Error`] becomes bytes on
//! the wire. Clients that asked for JSON (or that hit an `/api/` path) get an
//! envelope:
//!
//! ```text
//! {"error":{"code":"E_QUOTA","message":"quota exceeded","status":429}}
//! ```
//!
//! everyone else gets the message as `text/plain`.
//!
//! The message is sent verbatim. Handlers must not put sensitive details in
//! the errors they return.

use http::header::{self, HeaderValue};
use serde::Serialize;
use tracing::warn;

use crate::error::Error;
use crate::request::Request;
use crate::response::ResponseWriter;

const DEFAULT_STATUS: u16 = 500;

#[derive(Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

// Field order is the wire order.
#[derive(Serialize)]
struct Body<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    message: &'a str,
    status: u16,
}

/// Content negotiation for error responses.
///
/// JSON if `accept` mentions `application/json` anywhere, or if `path` is
/// under `/api/`. This is a loose reading of `Accept`, but it is what both
/// API clients and a browser pointed at an API route expect.
pub fn wants_json(accept: &str, path: &str) -> bool {
    accept.contains("application/json") || path.starts_with("/api/")
}

fn should_render_json(req: &Request) -> bool {
    wants_json(req.header("accept").unwrap_or_default(), req.path())
}

/// Writes `err` to `w` as the response to `req`.
///
/// The status is the error's declared status code, or `500`. Any
/// `Content-Encoding` set upstream is removed, since the error body is always
/// fresh, uncompressed content.
///
/// Must only be called while nothing has been written to `w`.
pub fn render(w: &mut ResponseWriter, req: &Request, err: &Error) {
    let status = err.status_code().unwrap_or(DEFAULT_STATUS);
    let code = err.code().filter(|code| !code.is_empty());
    let message = err.message();

    let headers = w.headers_mut();
    headers.remove(header::CONTENT_ENCODING);

    if should_render_json(req) {
        let envelope = Envelope { error: Body { code, message: &message, status } };

        // If the envelope cannot be encoded the client still gets the status.
        let body = serde_json::to_vec(&envelope).unwrap_or_else(|e| {
            warn!(error = %e, status, "failed to encode error response");
            Vec::new()
        });

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        w.write_header(status);
        if !body.is_empty() {
            w.write(&body);
        }
    } else {
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        w.write_header(status);
        w.write(message.as_bytes());
        w.write(b"\n");
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;
    use std::fmt;

    use bytes::Bytes;

    use super::*;
    use crate::error::{HasErrorCode, HasStatusCode};

    /// Error with an optional inner error and a declared status.
    #[derive(Debug)]
    struct StatusErr {
        inner: Option<&'static str>,
        status: u16,
    }

    impl fmt::Display for StatusErr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.inner.unwrap_or_default())
        }
    }

    impl StdError for StatusErr {}

    impl HasStatusCode for StatusErr {
        fn status_code(&self) -> u16 {
            self.status
        }
    }

    /// Error with an optional inner error and an application code.
    #[derive(Debug)]
    struct CodedErr {
        inner: Option<&'static str>,
        code: &'static str,
    }

    impl fmt::Display for CodedErr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.inner.unwrap_or_default())
        }
    }

    impl StdError for CodedErr {}

    impl HasErrorCode for CodedErr {
        fn error_code(&self) -> &str {
            self.code
        }
    }

    fn request(path: &str, accept: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(path);
        if let Some(accept) = accept {
            builder = builder.header("accept", accept);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    fn rendered(req: &Request, err: Error) -> ResponseWriter {
        let mut w = ResponseWriter::new();
        render(&mut w, req, &err);
        w
    }

    fn body(w: &ResponseWriter) -> &str {
        std::str::from_utf8(w.body()).unwrap()
    }

    #[test]
    fn negotiation() {
        let cases = [
            ("", "", false),
            ("", "/api", false),
            ("", "/api/", true),
            ("application/json", "", true),
            ("application/json", "/api/", true),
            ("text/html, application/json;q=0.9", "/", true),
            ("text/html", "/apis/x", false),
        ];
        for (i, (accept, path, want)) in cases.into_iter().enumerate() {
            assert_eq!(
                wants_json(accept, path),
                want,
                "{i}. accept={accept:?} path={path:?}"
            );
        }
    }

    #[test]
    fn negotiation_reads_request() {
        assert!(!should_render_json(&request("/", None)));
        assert!(should_render_json(&request("/api/users", None)));
        assert!(should_render_json(&request("/", Some("application/json"))));
    }

    #[test]
    fn plain_error_is_500_text() {
        let io = std::io::Error::other("ERR");
        let w = rendered(&request("/", None), io.into());
        assert_eq!(w.status(), Some(500));
        assert_eq!(body(&w), "ERR\n");
        assert_eq!(w.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(w.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[test]
    fn declared_status_is_used() {
        let req = request("/", None);

        let w = rendered(&req, Error::with_status(StatusErr { inner: None, status: 3 }));
        assert_eq!(w.status(), Some(3));
        assert_eq!(body(&w), "\n");

        let err = StatusErr { inner: Some("bad status code"), status: 3 };
        let w = rendered(&req, Error::with_status(err));
        assert_eq!(w.status(), Some(3));
        assert_eq!(body(&w), "bad status code\n");
    }

    #[test]
    fn zero_status_falls_back_to_500() {
        let err = StatusErr { inner: Some("zero"), status: 0 };
        let w = rendered(&request("/", None), Error::with_status(err));
        assert_eq!(w.status(), Some(500));
    }

    #[test]
    fn coded_error_renders_json_envelope() {
        let req = request("/", Some("application/json"));

        let err = CodedErr { inner: None, code: "418 I'm not a Teapot" };
        let w = rendered(&req, Error::with_code(err));
        assert_eq!(w.status(), Some(500));
        assert_eq!(
            body(&w),
            r#"{"error":{"code":"418 I'm not a Teapot","message":"","status":500}}"#
        );

        let err = CodedErr { inner: Some("something happened"), code: "418 I'm not a Teapot" };
        let w = rendered(&req, Error::with_code(err));
        assert_eq!(w.status(), Some(500));
        assert_eq!(
            body(&w),
            r#"{"error":{"code":"418 I'm not a Teapot","message":"something happened","status":500}}"#
        );
        assert_eq!(w.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(w.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(w.headers()[header::CONTENT_LENGTH], w.body().len().to_string().as_str());
    }

    #[test]
    fn json_without_code_omits_field() {
        let w = rendered(&request("/api/things", None), Error::not_found("no such thing"));
        assert_eq!(w.status(), Some(404));
        assert_eq!(body(&w), r#"{"error":{"message":"no such thing","status":404}}"#);
    }

    #[test]
    fn strips_content_encoding() {
        let req = request("/", None);
        let mut w = ResponseWriter::new();
        w.headers_mut().insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        render(&mut w, &req, &Error::server_error("boom"));
        assert!(w.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body(&w), "boom\n");
    }
}

//! Incoming HTTP request type.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, request::Parts};

/// An incoming HTTP request with its body fully buffered.
///
/// Handlers receive `&Request`, so one value can be inspected by every layer
/// of a middleware stack and by the error renderer afterwards.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self { method: parts.method, uri: parts.uri, headers: parts.headers, body }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Returns `None` for absent headers and
    /// for values that are not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req: Request = http::Request::builder()
            .uri("/api/users?id=1")
            .header("Accept", "application/json")
            .body(Bytes::from_static(b"{}"))
            .unwrap()
            .into();

        assert_eq!(req.header("accept"), Some("application/json"));
        assert_eq!(req.header("ACCEPT"), Some("application/json"));
        assert_eq!(req.header("x-missing"), None);
        assert_eq!(req.path(), "/api/users");
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.body(), b"{}");
    }
}

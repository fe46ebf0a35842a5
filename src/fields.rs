//! Request-scoped diagnostic fields.
//!
//! Middleware attaches key/value pairs (request id, user id, …) as the request
//! moves inward; log statements flatten them when they fire. [`Fields`] is a
//! persistent list: [`Fields::with`] returns a new value sharing its tail, so
//! an inner handler's additions never leak back into an outer one.

use std::fmt;
use std::sync::Arc;

/// Immutable, shareable list of diagnostic key/value pairs.
#[derive(Clone, Default)]
pub struct Fields {
    head: Option<Arc<Node>>,
}

struct Node {
    key: &'static str,
    value: String,
    prev: Option<Arc<Node>>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of `self` with one more pair. `self` is untouched.
    pub fn with(&self, key: &'static str, value: impl fmt::Display) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key,
                value: value.to_string(),
                prev: self.head.clone(),
            })),
        }
    }

    /// Most recent value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Newest first.
    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        std::iter::successors(self.head.as_deref(), |node| node.prev.as_deref())
            .map(|node| (node.key, node.value.as_str()))
    }

    /// All pairs in the order they were added. Duplicate keys are kept.
    pub fn flatten(&self) -> Vec<(&'static str, &str)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.reverse();
        pairs
    }
}

/// `key=value` pairs separated by spaces, oldest first. Used as a single
/// `tracing` field value.
impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.flatten().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value:?}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.flatten()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_does_not_mutate_original() {
        let base = Fields::new().with("request_id", "abc");
        let inner = base.with("user", "alice");

        assert_eq!(base.flatten(), vec![("request_id", "abc")]);
        assert_eq!(inner.flatten(), vec![("request_id", "abc"), ("user", "alice")]);
    }

    #[test]
    fn get_returns_latest_value() {
        let fields = Fields::new().with("user", "anonymous").with("user", 42);
        assert_eq!(fields.get("user"), Some("42"));
        assert_eq!(fields.get("missing"), None);
        assert_eq!(fields.flatten().len(), 2);
    }

    #[test]
    fn display_quotes_values() {
        let fields = Fields::new().with("method", "GET").with("path", "/api/x");
        assert_eq!(fields.to_string(), r#"method="GET" path="/api/x""#);
        assert_eq!(Fields::new().to_string(), "");
        assert!(Fields::new().is_empty());
    }
}

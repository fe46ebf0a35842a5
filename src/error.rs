//! Handler failures.
//!
//! A handler that cannot produce its response returns an [`Error`]. The
//! dispatch layer turns it into a response (see [`render`](fn@crate::render)).
//!
//! Any `std::error::Error` converts into a plain [`Error`] with `?`, which
//! renders as `500 Internal Server Error`. Error types that know better opt into
//! one or both capabilities:
//!
//! - [`HasStatusCode`]: the HTTP status to send;
//! - [`HasErrorCode`]: an application error code for API clients.
//!
//! and are converted with [`Error::with_status`], [`Error::with_code`] or
//! [`Error::with_status_and_code`].
//!
//! ```rust
//! use strata::Error;
//!
//! let err = Error::bad_request("missing field `name`");
//! assert_eq!(err.status_code(), Some(400));
//! assert_eq!(err.to_string(), "missing field `name`");
//! ```
//!
//! The message of every error is sent to the client. Do not put secrets in it.

use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

/// Implemented by errors that carry an HTTP status code.
///
/// A value of `0` means "not declared".
///
/// # Capabilities are not inferred by `?`
///
/// `?` goes through the blanket `From` impl, which sees only
/// `std::error::Error` and produces a plain `500`. Convert explicitly with
/// [`Error::with_status`] or [`Error::with_status_and_code`] to keep the
/// status:
///
/// ```rust
/// use strata::{Error, HasStatusCode};
///
/// #[derive(Debug)]
/// struct Teapot;
/// impl std::fmt::Display for Teapot {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("short and stout")
///     }
/// }
/// impl std::error::Error for Teapot {}
/// impl HasStatusCode for Teapot {
///     fn status_code(&self) -> u16 { 418 }
/// }
///
/// assert_eq!(Error::from(Teapot).status_code(), None);
/// assert_eq!(Error::with_status(Teapot).status_code(), Some(418));
/// ```
pub trait HasStatusCode {
    fn status_code(&self) -> u16;
}

/// Implemented by errors that carry an application error code.
///
/// As with [`HasStatusCode`], `?` does not pick the code up. Use
/// [`Error::with_code`] or [`Error::with_status_and_code`].
pub trait HasErrorCode {
    fn error_code(&self) -> &str;
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The failure value returned by handlers.
///
/// Does not implement `std::error::Error` itself; that is what allows the
/// blanket `From` impl for every `std::error::Error`.
pub struct Error {
    source: BoxError,
    status: Option<u16>,
    code: Option<String>,
}

impl Error {
    /// An error with a message and a status code.
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        let message: String = message.into();
        Self {
            source: message.into(),
            status: Some(status.as_u16()),
            code: None,
        }
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    /// `403 Forbidden`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::FORBIDDEN)
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::NOT_FOUND)
    }

    /// `500 Internal Server Error`.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// `501 Not Implemented` with the message "not implemented".
    pub fn not_implemented() -> Self {
        Self::new("not implemented", StatusCode::NOT_IMPLEMENTED)
    }

    /// Wraps an error without any capability. Same as `From`.
    pub fn plain<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self { source: Box::new(err), status: None, code: None }
    }

    /// Wraps an error that declares its own status code.
    pub fn with_status<E>(err: E) -> Self
    where
        E: StdError + HasStatusCode + Send + Sync + 'static,
    {
        let status = Some(err.status_code());
        Self { source: Box::new(err), status, code: None }
    }

    /// Wraps an error that carries an application error code.
    pub fn with_code<E>(err: E) -> Self
    where
        E: StdError + HasErrorCode + Send + Sync + 'static,
    {
        let code = Some(err.error_code().to_owned());
        Self { source: Box::new(err), status: None, code }
    }

    /// Wraps an error that has both capabilities.
    pub fn with_status_and_code<E>(err: E) -> Self
    where
        E: StdError + HasStatusCode + HasErrorCode + Send + Sync + 'static,
    {
        let status = Some(err.status_code());
        let code = Some(err.error_code().to_owned());
        Self { source: Box::new(err), status, code }
    }

    /// Attaches (or replaces) the application error code.
    pub fn code_as(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The declared status code, if any. A declared `0` counts as undeclared.
    pub fn status_code(&self) -> Option<u16> {
        self.status.filter(|&status| status != 0)
    }

    /// The application error code, if the error has one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    /// The textual description sent to the client.
    pub fn message(&self) -> String {
        self.source.to_string()
    }

    /// The wrapped error.
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.source
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

impl<E> From<E> for Error
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::plain(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("source", &self.source)
            .field("status", &self.status)
            .field("code", &self.code)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Teapot;

    impl fmt::Display for Teapot {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("short and stout")
        }
    }

    impl StdError for Teapot {}

    impl HasStatusCode for Teapot {
        fn status_code(&self) -> u16 {
            418
        }
    }

    impl HasErrorCode for Teapot {
        fn error_code(&self) -> &str {
            "TEAPOT"
        }
    }

    #[test]
    fn question_mark_drops_capabilities() {
        fn fails() -> Result<(), Error> {
            Err(Teapot)?;
            Ok(())
        }

        let err = fails().unwrap_err();
        assert_eq!(err.status_code(), None);
        assert_eq!(err.code(), None);
        assert_eq!(err.message(), "short and stout");
    }

    #[test]
    fn plain_error_has_no_capabilities() {
        let io = std::io::Error::other("disk on fire");
        let err: Error = io.into();
        assert_eq!(err.status_code(), None);
        assert_eq!(err.code(), None);
        assert_eq!(err.message(), "disk on fire");
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn capabilities_are_probed_on_conversion() {
        assert_eq!(Error::with_status(Teapot).status_code(), Some(418));
        assert_eq!(Error::with_status(Teapot).code(), None);

        let err = Error::with_code(Teapot);
        assert_eq!(err.status_code(), None);
        assert!(err.has_code("TEAPOT"));

        let err = Error::with_status_and_code(Teapot);
        assert_eq!(err.status_code(), Some(418));
        assert_eq!(err.code(), Some("TEAPOT"));
        assert_eq!(err.to_string(), "short and stout");
    }

    #[test]
    fn zero_status_is_undeclared() {
        #[derive(Debug)]
        struct Unset;

        impl fmt::Display for Unset {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("unset")
            }
        }

        impl StdError for Unset {}

        impl HasStatusCode for Unset {
            fn status_code(&self) -> u16 {
                0
            }
        }

        assert_eq!(Error::with_status(Unset).status_code(), None);
    }

    #[test]
    fn helpers_set_status() {
        assert_eq!(Error::bad_request("x").status_code(), Some(400));
        assert_eq!(Error::forbidden("x").status_code(), Some(403));
        assert_eq!(Error::not_found("x").status_code(), Some(404));
        assert_eq!(Error::server_error("x").status_code(), Some(500));

        let err = Error::not_implemented();
        assert_eq!(err.status_code(), Some(501));
        assert_eq!(err.message(), "not implemented");

        let err = Error::bad_request("nope").code_as("E42");
        assert!(err.has_code("E42"));
    }
}

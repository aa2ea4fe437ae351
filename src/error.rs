//! Unified error type.
//!
//! Every failure that can reach the error sink, whatever its origin, is an
//! [`Error`]: a handler returning `Err`, a handler panicking, a continuation
//! run twice, a transport that went away mid-request. The sink only needs
//! three things from it: a status, whether the message may be shown to the
//! client, and any headers the failure wants on the response.

use std::any::Any;
use std::borrow::Cow;
use std::io;

use http::{HeaderName, HeaderValue, StatusCode};

/// A boxed, thread-safe error, used for sources and body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `Result` with [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Where a failure came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Application failure carrying HTTP metadata (status, expose, headers).
    Http,
    /// A continuation was run more than once at the same depth.
    NextCalledTwice,
    /// A handler panicked with a string payload.
    Panic,
    /// A handler panicked with a payload that is not an error message.
    NonError,
    /// The connection closed before the pipeline settled.
    Aborted,
    /// I/O failure, from a handler or from the listener.
    Io,
    /// Anything else: serialization, response building.
    Internal,
}

/// The error type used throughout strata.
///
/// ```rust
/// use strata::Error;
///
/// // 4xx errors are exposed to the client by default, 5xx are not.
/// let err = Error::http(400, "bad field 'x'");
/// assert!(err.expose());
/// assert_eq!(err.status(), Some(400));
///
/// let err = Error::new("database unreachable");
/// assert!(!err.expose());
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    expose: bool,
    code: Option<Cow<'static, str>>,
    headers: Vec<(HeaderName, HeaderValue)>,
    headers_sent: bool,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            expose: false,
            code: None,
            headers: Vec::new(),
            headers_sent: false,
            source: None,
        }
    }

    /// An internal failure: no status (the sink picks 500), never exposed.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, message)
    }

    /// An application failure with an intended HTTP status.
    ///
    /// Client errors (`status < 500`) are exposable; server errors are not.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            expose: status < 500,
            ..Self::with_kind(ErrorKind::Http, message)
        }
    }

    /// An application failure whose message is the status reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        Self::http(status.as_u16(), status.canonical_reason().unwrap_or_default())
    }

    pub(crate) fn next_called_twice() -> Self {
        Self::with_kind(ErrorKind::NextCalledTwice, "next() called multiple times")
    }

    pub(crate) fn aborted() -> Self {
        Self::with_kind(ErrorKind::Aborted, "request aborted")
            .with_code("ECONNRESET")
    }

    /// Converts a caught panic payload.
    ///
    /// String payloads (everything `panic!` produces) become
    /// [`ErrorKind::Panic`]; anything else is a contract violation and
    /// becomes [`ErrorKind::NonError`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<String>() {
            Ok(msg) => return Self::with_kind(ErrorKind::Panic, *msg),
            Err(other) => other,
        };
        match payload.downcast::<&'static str>() {
            Ok(msg) => Self::with_kind(ErrorKind::Panic, *msg),
            Err(_) => Self::with_kind(ErrorKind::NonError, "non-error thrown: opaque panic payload"),
        }
    }

    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn message(&self) -> &str { &self.message }
    pub fn status(&self) -> Option<u16> { self.status }
    pub fn expose(&self) -> bool { self.expose }
    pub fn code(&self) -> Option<&str> { self.code.as_deref() }
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] { &self.headers }

    /// `true` once the sink found the response already on the wire.
    pub fn headers_sent(&self) -> bool { self.headers_sent }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Machine-readable code, e.g. `ENOENT`. The sink maps `ENOENT` to 404.
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// A header to send along with the error response.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn mark_headers_sent(&mut self) {
        self.headers_sent = true;
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let code = (e.kind() == io::ErrorKind::NotFound).then_some("ENOENT");
        let mut err = Self::with_kind(ErrorKind::Io, format!("io: {e}"));
        err.code = code.map(Cow::Borrowed);
        err.with_source(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("json: {e}")).with_source(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Self::new(format!("http: {e}")).with_source(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_expose_client_failures_only() {
        assert!(Error::http(404, "missing").expose());
        assert!(!Error::http(503, "down").expose());
        assert_eq!(Error::from_status(StatusCode::FORBIDDEN).message(), "Forbidden");
    }

    #[test]
    fn io_not_found_carries_enoent() {
        let err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.code(), Some("ENOENT"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn panic_payloads_are_classified() {
        let err = Error::from_panic(Box::new(String::from("boom")));
        assert_eq!((err.kind(), err.message()), (ErrorKind::Panic, "boom"));

        let err = Error::from_panic(Box::new("static boom"));
        assert_eq!(err.kind(), ErrorKind::Panic);

        let err = Error::from_panic(Box::new(42_u32));
        assert_eq!(err.kind(), ErrorKind::NonError);
    }
}

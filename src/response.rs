//! Outgoing HTTP response view and the staged [`Body`].
//!
//! Nothing here writes to the wire. Handlers stage status, headers and a
//! body; the responder flushes them once the pipeline settles.

use std::borrow::Cow;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http::header::{AsHeaderName, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, TRANSFER_ENCODING, VARY};
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::{Value, json};

use crate::error::{BoxError, Result};
use crate::request::headers_json;
use crate::status;
use crate::transport::RawResponse;

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// A staged response body.
///
/// The variant decides both the default `Content-Type` and how the
/// responder writes it.
pub enum Body {
    /// Raw bytes, written verbatim.
    Bytes(Bytes),
    /// Text, written verbatim.
    Text(String),
    /// A structured value, serialized to JSON when flushed.
    Json(Value),
    /// A chunk stream, piped to the transport.
    Stream(BodyStream),
}

impl Body {
    /// Wraps any fallible byte stream.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::Stream(Box::pin(stream.map_err(Into::into)))
    }

    /// Byte length, when knowable without consuming the body.
    pub fn byte_len(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Text(text) => Some(text.len() as u64),
            Self::Json(value) => Some(value.to_string().len() as u64),
            Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self { Self::Text(text.to_owned()) }
}

impl From<String> for Body {
    fn from(text: String) -> Self { Self::Text(text) }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self { Self::Bytes(bytes) }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self { Self::Bytes(bytes.into()) }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self { Self::Json(value) }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// The staged response of one request.
pub struct Response {
    raw: RawResponse,
    body: Option<Body>,
    message: Option<String>,
    explicit_status: bool,
    explicit_null_body: bool,
}

impl Response {
    pub(crate) fn new(raw: RawResponse) -> Self {
        Self { raw, body: None, message: None, explicit_status: false, explicit_null_body: false }
    }

    pub fn raw(&self) -> &RawResponse { &self.raw }
    pub fn raw_mut(&mut self) -> &mut RawResponse { &mut self.raw }

    pub fn status(&self) -> StatusCode { self.raw.status() }

    /// Sets the status. Ignored once headers are sent.
    ///
    /// Switching to a status that forbids a body (204, 205, 304) drops any
    /// staged body.
    pub fn set_status(&mut self, code: StatusCode) {
        if self.raw.headers_sent() {
            return;
        }
        self.explicit_status = true;
        self.message = None;
        self.raw.set_status(code);
        if self.body.is_some() && status::is_empty_body(code.as_u16()) {
            self.clear_body();
        }
    }

    /// Reason phrase: the custom message if set, else the table entry.
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .or_else(|| status::reason(self.status().as_u16()))
            .unwrap_or_default()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn body(&self) -> Option<&Body> { self.body.as_ref() }

    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// `true` after [`clear_body`](Self::clear_body).
    pub fn explicit_null_body(&self) -> bool {
        self.explicit_null_body
    }

    /// Explicitly stages *no* body.
    ///
    /// The status becomes 204 unless it already forbids a body, and
    /// `Content-Type`, `Content-Length`, `Transfer-Encoding` are removed.
    /// The responder then ends the response empty.
    pub fn clear_body(&mut self) {
        self.body = None;
        if !status::is_empty_body(self.status().as_u16()) {
            self.set_status(StatusCode::NO_CONTENT);
        }
        self.explicit_null_body = true;
        self.remove_header(CONTENT_TYPE);
        self.remove_header(CONTENT_LENGTH);
        self.remove_header(TRANSFER_ENCODING);
    }

    /// Stages a body, adjusting status and entity headers.
    ///
    /// The status becomes 200 unless it was set explicitly. A
    /// `Content-Type` is picked from the variant when none is set.
    /// `Content-Length` is set for bytes and text and removed for JSON and
    /// streams, whose length is only known at flush time.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        let body = body.into();
        self.explicit_null_body = false;
        if !self.explicit_status {
            self.set_status(StatusCode::OK);
        }
        let set_type = !self.has_header(CONTENT_TYPE);

        match &body {
            Body::Text(text) => {
                if set_type {
                    let html = text.trim_start().starts_with('<');
                    self.set_type(if html { "html" } else { "text" });
                }
                self.set_length(text.len() as u64);
            }
            Body::Bytes(bytes) => {
                if set_type {
                    self.set_type("bin");
                }
                self.set_length(bytes.len() as u64);
            }
            Body::Stream(_) => {
                self.remove_header(CONTENT_LENGTH);
                if set_type {
                    self.set_type("bin");
                }
            }
            Body::Json(_) => {
                self.remove_header(CONTENT_LENGTH);
                self.set_type("json");
            }
        }
        self.body = Some(body);
    }

    /// `Content-Length` if set, else the staged body's length.
    pub fn length(&self) -> Option<u64> {
        match self.header(CONTENT_LENGTH) {
            Some(value) => value.trim().parse().ok(),
            None => self.body.as_ref()?.byte_len(),
        }
    }

    /// Sets `Content-Length`, unless the body is chunked.
    pub fn set_length(&mut self, length: u64) {
        if !self.has_header(TRANSFER_ENCODING) {
            self.raw.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
        }
    }

    /// `Content-Type` without parameters.
    pub fn content_type(&self) -> Option<&str> {
        let mime = self.header(CONTENT_TYPE)?.split(';').next()?.trim();
        (!mime.is_empty()).then_some(mime)
    }

    /// Sets `Content-Type` from a short alias (`text`, `html`, `json`,
    /// `bin`, `form`, `xml`) or a full mime string. Anything else removes
    /// the header.
    pub fn set_type(&mut self, ty: &str) {
        let value = mime_for(ty).and_then(|mime| HeaderValue::try_from(mime.as_ref()).ok());
        match value {
            Some(value) => {
                self.raw.headers_mut().insert(CONTENT_TYPE, value);
            }
            None => self.remove_header(CONTENT_TYPE),
        }
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.raw.headers().get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool {
        self.raw.headers().contains_key(name)
    }

    /// Replaces a header. Ignored once headers are sent.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if self.raw.headers_sent() {
            return Ok(());
        }
        let (name, value) = header_pair(name, value)?;
        self.raw.headers_mut().insert(name, value);
        Ok(())
    }

    /// Adds a header value, keeping existing ones. Ignored once headers are
    /// sent.
    pub fn append_header<K, V>(&mut self, name: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if self.raw.headers_sent() {
            return Ok(());
        }
        let (name, value) = header_pair(name, value)?;
        self.raw.headers_mut().append(name, value);
        Ok(())
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) {
        self.raw.headers_mut().remove(name);
    }

    pub fn clear_headers(&mut self) {
        self.raw.headers_mut().clear();
    }

    pub fn headers_sent(&self) -> bool { self.raw.headers_sent() }
    pub fn writable(&self) -> bool { self.raw.writable() }

    /// Redirects to `url`: sets `Location`, a 302 unless the current status
    /// is already a redirect, and a short text body.
    pub fn redirect(&mut self, url: &str) -> Result<()> {
        self.set_header(LOCATION, url)?;
        if !status::is_redirect(self.status().as_u16()) {
            self.set_status(StatusCode::FOUND);
        }
        self.set_type("text");
        self.set_body(format!("Redirecting to {url}."));
        Ok(())
    }

    /// Adds `field` to `Vary` unless already covered.
    pub fn vary(&mut self, field: &str) -> Result<()> {
        let current = self.header(VARY).unwrap_or_default().to_owned();
        let covered = current
            .split(',')
            .map(str::trim)
            .any(|f| f == "*" || f.eq_ignore_ascii_case(field));
        if covered {
            return Ok(());
        }
        let value = if current.trim().is_empty() { field.to_owned() } else { format!("{current}, {field}") };
        self.set_header(VARY, value)
    }

    /// Inspection snapshot.
    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status().as_u16(),
            "message": self.message(),
            "header": headers_json(self.raw.headers()),
        })
    }
}

fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue)>
where
    K: TryInto<HeaderName>,
    K::Error: Into<http::Error>,
    V: TryInto<HeaderValue>,
    V::Error: Into<http::Error>,
{
    let name = name.try_into().map_err(Into::<http::Error>::into)?;
    let value = value.try_into().map_err(Into::<http::Error>::into)?;
    Ok((name, value))
}

fn mime_for(ty: &str) -> Option<Cow<'_, str>> {
    let mime = match ty {
        "text" => "text/plain; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "bin" => "application/octet-stream",
        "form" => "application/x-www-form-urlencoded",
        "xml" => "application/xml",
        other if other.contains('/') => return Some(Cow::Borrowed(other)),
        _ => return None,
    };
    Some(Cow::Borrowed(mime))
}

//! The per-request context.
//!
//! One [`Context`] exists per in-flight request. It owns the request and
//! response views, a typed state bag, and a shared handle to the [`App`].
//! Handlers mostly talk to it through the forwarding accessors below rather
//! than reaching into [`Request`] or [`Response`] directly.
//!
//! It is also the error sink: every failure, from any depth of the
//! pipeline, ends up in [`Context::on_error`].

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{AsHeaderName, COOKIE, SET_COOKIE};
use http::{Extensions, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::{Value, json};
use tracing::error;

use crate::app::App;
use crate::error::{Error, ErrorKind, Result};
use crate::request::Request;
use crate::response::{Body, Response};
use crate::status;
use crate::transport::{self, HttpBody, RawResponse};

pub struct Context {
    request: Request,
    response: Response,
    app: Arc<App>,
    state: Extensions,
    cookies: Option<HashMap<String, String>>,
    respond: bool,
}

impl Context {
    /// Builds the context for one request.
    ///
    /// [`Callback`](crate::Callback) does this for every request; call it
    /// yourself only when driving a pipeline over a custom transport.
    pub fn new(app: Arc<App>, req: http::Request<HttpBody>, raw: RawResponse) -> Self {
        Self {
            request: Request::new(req),
            response: Response::new(raw),
            app,
            state: Extensions::new(),
            cookies: None,
            respond: true,
        }
    }

    pub fn app(&self) -> &App { &self.app }
    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }

    /// Request-scoped typed state, empty at the start of every request.
    pub fn state(&self) -> &Extensions { &self.state }
    pub fn state_mut(&mut self) -> &mut Extensions { &mut self.state }

    /// Whether the responder writes the response once the pipeline settles.
    pub fn respond(&self) -> bool { self.respond }

    /// Turns the responder off, for handlers that write through
    /// [`raw_mut`](Self::raw_mut) themselves.
    pub fn set_respond(&mut self, respond: bool) {
        self.respond = respond;
    }

    /// The transport descriptor, bypassing the staged response.
    pub fn raw_mut(&mut self) -> &mut RawResponse {
        self.response.raw_mut()
    }

    // ── Request forwarding ────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { self.request.method() }
    pub fn url(&self) -> &str { self.request.url() }
    pub fn original_url(&self) -> &str { self.request.original_url() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn query(&self) -> &str { self.request.query() }

    /// Request header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    // ── Response forwarding ───────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode { self.response.status() }
    pub fn set_status(&mut self, code: StatusCode) { self.response.set_status(code) }
    pub fn message(&self) -> &str { self.response.message() }
    pub fn set_message(&mut self, message: impl Into<String>) { self.response.set_message(message) }
    pub fn body(&self) -> Option<&Body> { self.response.body() }
    pub fn set_body(&mut self, body: impl Into<Body>) { self.response.set_body(body) }
    pub fn clear_body(&mut self) { self.response.clear_body() }
    pub fn length(&self) -> Option<u64> { self.response.length() }
    pub fn set_length(&mut self, length: u64) { self.response.set_length(length) }
    pub fn set_type(&mut self, ty: &str) { self.response.set_type(ty) }
    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool { self.response.has_header(name) }
    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) { self.response.remove_header(name) }
    pub fn headers_sent(&self) -> bool { self.response.headers_sent() }
    pub fn writable(&self) -> bool { self.response.writable() }

    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.response.set_header(name, value)
    }

    pub fn append_header<K, V>(&mut self, name: K, value: V) -> Result<()>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.response.append_header(name, value)
    }

    pub fn redirect(&mut self, url: &str) -> Result<()> { self.response.redirect(url) }
    pub fn vary(&mut self, field: &str) -> Result<()> { self.response.vary(field) }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// `Ok` if `condition` holds, else an HTTP error with `status`.
    ///
    /// ```rust,ignore
    /// ctx.assert(ctx.header("authorization").is_some(), 401, "missing token")?;
    /// ```
    pub fn assert(&self, condition: bool, status: u16, message: &str) -> Result<()> {
        if condition { Ok(()) } else { Err(Error::http(status, message)) }
    }

    /// Cookie accessor, parsed from the request on first use.
    pub fn cookies(&mut self) -> Cookies<'_> {
        let request = &self.request;
        let jar = self.cookies.get_or_insert_with(|| parse_cookies(request));
        Cookies { jar, response: &mut self.response }
    }

    /// Inspection snapshot of the whole context.
    pub fn to_json(&self) -> Value {
        json!({
            "request": self.request.to_json(),
            "response": self.response.to_json(),
            "app": self.app.to_json(),
            "originalUrl": self.request.original_url(),
            "respond": self.respond,
        })
    }

    // ── Error sink ────────────────────────────────────────────────────────────

    /// Reports a failure and, if still possible, answers with it.
    ///
    /// `None` is a no-op. Observers registered on the [`App`] are notified
    /// before anything is written, and are notified even when the response
    /// can no longer be changed. Otherwise staged headers are replaced by
    /// the error's own, and the body is the error message if the error is
    /// exposable, else the status reason phrase.
    pub fn on_error(&mut self, err: impl Into<Option<Error>>) {
        let Some(mut err) = err.into() else {
            return;
        };
        if err.kind() == ErrorKind::NonError {
            error!(error = %err, "handler panicked with a non-error payload");
        }
        if self.response.headers_sent() || !self.response.writable() {
            err.mark_headers_sent();
        }

        let app = Arc::clone(&self.app);
        app.report(&err, self);

        if err.headers_sent() {
            return;
        }

        let res = &mut self.response;
        res.clear_headers();
        for (name, value) in err.headers() {
            res.raw_mut().headers_mut().insert(name.clone(), value.clone());
        }
        res.set_type("text");

        let mut code = err.status();
        if err.code() == Some("ENOENT") {
            code = Some(404);
        }
        let code = code.filter(|c| status::is_registered(*c)).unwrap_or(500);
        let reason = status::reason(code).unwrap_or_default();
        let message = if err.expose() { err.message() } else { reason };

        res.set_status(StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
        res.set_length(message.len() as u64);
        res.raw_mut().end(transport::full(message.to_owned()));
    }
}

#[cfg(test)]
impl Context {
    /// A context over a fresh transport channel, with a default [`App`].
    pub(crate) fn for_test(method: Method, uri: &str) -> (Self, transport::Pending) {
        let (raw, pending) = transport::channel();
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(transport::empty())
            .expect("valid test request");
        (Self::new(Arc::new(App::default()), req, raw), pending)
    }
}

fn parse_cookies(request: &Request) -> HashMap<String, String> {
    request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_owned(), value.trim().to_owned()))
        })
        .collect()
}

// ── Cookies ───────────────────────────────────────────────────────────────────

/// Attributes for an outgoing cookie.
#[derive(Clone, Debug)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<u64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<&'static str>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_owned(),
            domain: None,
            max_age: None,
            http_only: true,
            secure: false,
            same_site: None,
        }
    }
}

/// Reads cookies from the request, writes `Set-Cookie` on the response.
pub struct Cookies<'a> {
    jar: &'a HashMap<String, String>,
    response: &'a mut Response,
}

impl Cookies<'_> {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.jar.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str, options: &CookieOptions) -> Result<()> {
        let mut cookie = format!("{name}={value}; Path={}", options.path);
        if let Some(domain) = &options.domain {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        if let Some(max_age) = options.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(same_site) = options.same_site {
            cookie.push_str(&format!("; SameSite={same_site}"));
        }
        if options.secure {
            cookie.push_str("; Secure");
        }
        if options.http_only {
            cookie.push_str("; HttpOnly");
        }
        self.response.append_header(SET_COOKIE, cookie)
    }

    /// Expires `name` on the client.
    pub fn remove(&mut self, name: &str, options: &CookieOptions) -> Result<()> {
        let options = CookieOptions { max_age: Some(0), ..options.clone() };
        self.set(name, "", &options)
    }
}

//! Incoming HTTP request view.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, Uri, Version};
use serde_json::{Map, Value, json};

use crate::transport::HttpBody;

/// Read-mostly view over the request the transport delivered.
pub struct Request {
    parts: http::request::Parts,
    body: Option<HttpBody>,
    original_url: String,
}

impl Request {
    pub(crate) fn new(req: http::Request<HttpBody>) -> Self {
        let (parts, body) = req.into_parts();
        let original_url = path_and_query(&parts.uri).to_owned();
        Self { parts, body: Some(body), original_url }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }

    pub fn is_head(&self) -> bool {
        self.parts.method == Method::HEAD
    }

    /// Path and query, e.g. `/users?page=2`.
    pub fn url(&self) -> &str {
        path_and_query(&self.parts.uri)
    }

    /// The URL as received, before any handler rewrote it.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Replaces the request URI, e.g. for internal rewrites.
    pub fn set_uri(&mut self, uri: Uri) {
        self.parts.uri = uri;
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Raw query string without the `?`, empty if absent.
    pub fn query(&self) -> &str {
        self.parts.uri.query().unwrap_or_default()
    }

    /// `1` for HTTP/0.9 through 1.1, `2` for HTTP/2, `3` for HTTP/3.
    pub fn http_version_major(&self) -> u8 {
        match self.parts.version {
            v if v >= Version::HTTP_3 => 3,
            v if v >= Version::HTTP_2 => 2,
            _ => 1,
        }
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Length`, if present and valid.
    pub fn length(&self) -> Option<u64> {
        self.header(CONTENT_LENGTH.as_str())?.trim().parse().ok()
    }

    /// Mime type of the body, without parameters: `text/html; charset=utf-8`
    /// reads as `text/html`.
    pub fn content_type(&self) -> Option<&str> {
        let value = self.header(CONTENT_TYPE.as_str())?;
        let mime = value.split(';').next().unwrap_or_default().trim();
        (!mime.is_empty()).then_some(mime)
    }

    pub fn body_mut(&mut self) -> Option<&mut HttpBody> {
        self.body.as_mut()
    }

    /// Takes the body out of the request. Later calls return `None`.
    pub fn take_body(&mut self) -> Option<HttpBody> {
        self.body.take()
    }

    /// Inspection snapshot.
    pub fn to_json(&self) -> Value {
        json!({
            "method": self.parts.method.as_str(),
            "url": self.url(),
            "header": headers_json(&self.parts.headers),
        })
    }
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}

pub(crate) fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        map.insert(name.as_str().to_owned(), Value::String(values.join(", ")));
    }
    Value::Object(map)
}

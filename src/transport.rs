//! The transport descriptor the core writes through.
//!
//! strata never touches sockets or bytes on the wire. Per request it gets a
//! [`RawResponse`]: a status, a header map, and a one-shot `end` that hands
//! the finished response to whoever owns the connection (the hyper service
//! in [`Server`](crate::Server), or a test). The other half of the channel is
//! a [`Pending`] the connection side awaits.
//!
//! ```text
//!  request task                         connection task
//!  ────────────                         ───────────────
//!  RawResponse ── end(body) ──oneshot──▶ Pending::response()
//!      ▲                                     │
//!      └──────────── watch: Lifecycle ◀──────┘ (Aborted on drop)
//! ```
//!
//! The lifecycle signal is how the dispatcher learns that the connection
//! went away while handlers were still running.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::{oneshot, watch};
use tracing::error;

use crate::error::BoxError;
use crate::response::BodyStream;

/// Body type for both directions of the transport.
pub type HttpBody = UnsyncBoxBody<Bytes, BoxError>;

/// Where a response is in its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    /// Nothing written yet.
    Open,
    /// `end` was called; the response is on its way out.
    Finished,
    /// The connection side gave up before a response was written.
    Aborted,
}

/// Creates a connected `RawResponse` / `Pending` pair.
pub fn channel() -> (RawResponse, Pending) {
    let (tx, rx) = oneshot::channel();
    let (lifecycle, _) = watch::channel(Lifecycle::Open);
    let lifecycle = Arc::new(lifecycle);
    let raw = RawResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        sink: Some(tx),
        lifecycle: Arc::clone(&lifecycle),
    };
    (raw, Pending { rx, lifecycle })
}

/// Writable side of one response.
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    sink: Option<oneshot::Sender<http::Response<HttpBody>>>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
}

impl RawResponse {
    pub fn status(&self) -> StatusCode { self.status }
    pub fn set_status(&mut self, status: StatusCode) { self.status = status; }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// `true` once `end` has been called. Status and headers are frozen from
    /// then on.
    pub fn headers_sent(&self) -> bool {
        self.sink.is_none()
    }

    /// `true` while a response can still be delivered: not ended, and the
    /// connection side is still waiting.
    pub fn writable(&self) -> bool {
        self.sink.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Sends status, headers and `body` as the one and only response.
    ///
    /// Returns `false` if a response was already sent or nobody is waiting
    /// for it anymore.
    pub fn end(&mut self, body: HttpBody) -> bool {
        let Some(sink) = self.sink.take() else {
            return false;
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers.clone();
        self.lifecycle.send_replace(Lifecycle::Finished);
        sink.send(res).is_ok()
    }

    /// Current state, without waiting.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Resolves when the response leaves [`Lifecycle::Open`].
    ///
    /// The returned future does not borrow `self`, so it can be awaited
    /// while handlers hold the context.
    pub fn closed(&self) -> impl Future<Output = Lifecycle> + Send + 'static {
        let mut rx = self.lifecycle.subscribe();
        async move {
            let state = rx.wait_for(|state| *state != Lifecycle::Open).await.map(|state| *state);
            state.unwrap_or(Lifecycle::Aborted)
        }
    }
}

/// Connection side of one response.
///
/// Dropping it before the response arrives marks the response
/// [`Lifecycle::Aborted`].
pub struct Pending {
    rx: oneshot::Receiver<http::Response<HttpBody>>,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
}

impl Pending {
    /// Waits for the response.
    ///
    /// If the request task went away without writing one (it panicked
    /// outside the pipeline), answers `500` so the client is not left
    /// hanging.
    pub async fn response(mut self) -> http::Response<HttpBody> {
        match (&mut self.rx).await {
            Ok(res) => res,
            Err(_) => {
                error!("request task ended without writing a response");
                let mut res = http::Response::new(full("Internal Server Error"));
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res
            }
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.lifecycle.send_if_modified(|state| {
            let open = *state == Lifecycle::Open;
            if open {
                *state = Lifecycle::Aborted;
            }
            open
        });
    }
}

// ── Body constructors ─────────────────────────────────────────────────────────

pub(crate) fn empty() -> HttpBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn full(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn stream(body: BodyStream) -> HttpBody {
    StreamBody::new(body.map_ok(Frame::data)).boxed_unsync()
}

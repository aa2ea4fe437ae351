//! The application: configuration, the ordered handler list, and the
//! failure observers.
//!
//! An [`App`] is built by value and frozen once it is turned into a
//! [`Callback`]. From then on it is shared read-only behind an `Arc` by
//! every in-flight request.

use std::any::type_name;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::compose::{Pipeline, compose};
use crate::config::Config;
use crate::context::Context;
use crate::dispatch::dispatch;
use crate::error::{BoxError, Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::legacy::{self, Legacy};
use crate::server::Server;
use crate::transport::{self, HttpBody};

/// A failure observer, see [`App::on_failure`].
pub type Observer = Arc<dyn Fn(&Error, &Context) + Send + Sync>;

#[derive(Default)]
pub struct App {
    config: Config,
    middleware: Vec<BoxedHandler>,
    observers: Vec<Observer>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            middleware: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Appends `handler` to the pipeline. Handlers run in registration
    /// order on the way in and in reverse order on the way out.
    ///
    /// ```rust
    /// use strata::{App, BoxFuture, Context, Next, Result};
    ///
    /// fn hello<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<()>> {
    ///     Box::pin(async move {
    ///         ctx.set_body("hello");
    ///         Ok(())
    ///     })
    /// }
    ///
    /// let app = App::default().register(hello);
    /// ```
    pub fn register<H: Handler>(mut self, handler: H) -> Self {
        debug!(handler = type_name::<H>(), "register");
        self.middleware.push(Arc::new(handler));
        self
    }

    /// Converts a stepwise [`Legacy`] handler and appends it.
    pub fn register_legacy<L: Legacy>(self, handler: L) -> Self {
        warn!(
            handler = type_name::<L>(),
            "stepwise handlers are deprecated; write a Handler that awaits next.run(ctx)"
        );
        self.register(legacy::convert(handler))
    }

    /// Adds a failure observer.
    ///
    /// Observers run synchronously, in the order they were added, once for
    /// every failure reported through [`Context::on_error`]. They run before
    /// anything is written, and also for failures that happen after the
    /// response has gone out ([`Error::headers_sent`] is then `true`).
    ///
    /// With no observer added, failures are logged with `tracing::error!`,
    /// except 404s, exposable errors, and everything when
    /// [`Config::silent`] is set.
    pub fn on_failure<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Error, &Context) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    pub(crate) fn report(&self, err: &Error, ctx: &Context) {
        if !self.observers.is_empty() {
            for observer in &self.observers {
                observer(err, ctx);
            }
            return;
        }

        if self.config.silent || err.expose() || err.status() == Some(404) {
            return;
        }
        error!(
            kind = ?err.kind(),
            status = err.status(),
            method = %ctx.method(),
            path = ctx.path(),
            error = %err,
            source = std::error::Error::source(err).map(tracing::field::display),
            "request failed"
        );
    }

    /// Serializable summary of the application settings.
    pub fn to_json(&self) -> Value {
        self.config.to_json()
    }

    /// Freezes the application and composes its pipeline.
    pub fn into_callback(self) -> Callback {
        let pipeline = compose(self.middleware.iter().cloned());
        debug!(handlers = pipeline.len(), "pipeline composed");
        Callback {
            app: Arc::new(self),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Binds `addr` and serves until a shutdown signal arrives.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub async fn listen(self, addr: &str) -> Result<()> {
        Server::bind(addr).serve(self.into_callback()).await
    }

    /// Same as [`listen`](Self::listen), for an address already parsed.
    pub async fn listen_on(self, addr: SocketAddr) -> Result<()> {
        Server::from_addr(addr).serve(self.into_callback()).await
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("middleware", &self.middleware.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// The request handler produced by [`App::into_callback`].
///
/// Cheap to clone. Hand it to [`Server::serve`], or call it directly with
/// any `http::Request` to drive the pipeline without a socket.
#[derive(Clone)]
pub struct Callback {
    app: Arc<App>,
    pipeline: Arc<Pipeline>,
}

impl Callback {
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Runs one request through the pipeline.
    ///
    /// The pipeline runs on its own task. If the returned future is dropped
    /// before it resolves, the request is treated as aborted: handlers keep
    /// running, and the failure is reported once they settle.
    pub async fn call<B>(&self, req: http::Request<B>) -> http::Response<HttpBody>
    where
        B: hyper::body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let req = req.map(|body| body.map_err(Into::<BoxError>::into).boxed_unsync());
        let (raw, pending) = transport::channel();
        let mut ctx = Context::new(Arc::clone(&self.app), req, raw);
        let pipeline = Arc::clone(&self.pipeline);

        tokio::spawn(async move {
            dispatch(&mut ctx, &pipeline).await;
        });

        pending.response().await
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("app", &self.app)
            .field("handlers", &self.pipeline.len())
            .finish()
    }
}

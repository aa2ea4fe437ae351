//! Built-in middleware.
//!
//! Middleware are ordinary [`Handler`](crate::Handler)s; the ones here cover
//! cross-cutting concerns most applications want first in the chain.
//!
//! - [`trace`]: one log line per request with method, path, status, latency

use std::time::Instant;

use tracing::{info, warn};

use crate::compose::Next;
use crate::context::Context;
use crate::error::Result;
use crate::handler::{BoxFuture, Handler};

/// Logs every request once the rest of the chain has settled.
///
/// Register it first so its latency covers everything after it:
///
/// ```rust
/// use strata::{App, middleware};
///
/// let app = App::default().register(middleware::trace());
/// ```
///
/// Failures are logged with `warn!` and passed on unchanged.
pub fn trace() -> Trace {
    Trace
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Handler for Trace {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run(ctx).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1e3;

            match &result {
                Ok(()) => info!(
                    method = %ctx.method(),
                    path = ctx.path(),
                    status = ctx.status().as_u16(),
                    latency_ms,
                    "request"
                ),
                Err(err) => warn!(
                    method = %ctx.method(),
                    path = ctx.path(),
                    status = err.status().unwrap_or(500),
                    latency_ms,
                    error = %err,
                    "request failed"
                ),
            }
            result
        })
    }
}

//! Handler trait and type erasure.
//!
//! # Shape of a handler
//!
//! A handler receives the request's [`Context`] and a [`Next`] continuation.
//! Code before `next.run(ctx).await` runs on the way in, code after it runs
//! on the way out, once every handler nested inside has settled:
//!
//! ```rust
//! use strata::{BoxFuture, Context, Next, Result};
//!
//! fn timing<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
//!     Box::pin(async move {
//!         let started = std::time::Instant::now();
//!         next.run(ctx).await?;
//!         let elapsed = started.elapsed().as_millis().to_string();
//!         ctx.set_header("x-response-time", elapsed)?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! The future borrows the context mutably for `'a`, which is why handlers
//! return a boxed future instead of being plain `async fn`s: the lifetime of
//! the borrow has to show up in the return type.
//!
//! # How handlers are stored
//!
//! The pipeline holds handlers of *different* types in one `Vec`, so each is
//! erased behind `Arc<dyn Handler>`:
//!
//! ```text
//! fn timing<'a>(ctx, next) -> BoxFuture<'a, …>   ← user writes this
//!        ↓ app.register(timing)
//! Arc::new(timing)                               ← BoxedHandler
//!        ↓ compose(...)
//! handler.call(ctx, next)  at request time       ← one vtable dispatch
//! ```
//!
//! The runtime cost per handler per request is one virtual call and one
//! boxed future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::compose::Next;
use crate::context::Context;
use crate::error::Result;

/// A heap-allocated, type-erased future.
///
/// `Send` lets tokio move the request task across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Anything that can sit in the pipeline.
///
/// Implemented automatically for functions and closures with the signature
/// `for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>>`.
/// Implement it by hand for handlers that carry configuration.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>>;

    /// Erases the concrete type so the handler can be passed to
    /// [`compose`](crate::compose).
    fn boxed(self) -> BoxedHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        (self)(ctx, next)
    }
}

/// Pins down the signature of a handler closure.
///
/// Closures passed straight to a generic `impl Handler` parameter cannot
/// have their higher-ranked signature inferred; routing them through this
/// function gives the compiler the signature up front.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use strata::{App, handler_fn};
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let app = App::default().register(handler_fn(move |ctx, next| {
///     hits.fetch_add(1, Ordering::Relaxed);
///     Box::pin(async move { next.run(ctx).await })
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    f
}

//! Onion-model composition.
//!
//! [`compose`] turns an ordered list of handlers into one [`Pipeline`].
//! Running the pipeline enters handler 0; each handler enters the next one
//! by running its [`Next`]. The nesting gives the onion order:
//!
//! ```text
//!   a: before ─┐
//!     b: before ─┐
//!       c: before / after
//!     b: after  ─┘
//!   a: after  ─┘
//! ```
//!
//! A handler that never runs its `Next` ends the chain at its depth; every
//! handler registered after it is skipped and the pipeline settles with that
//! handler's own outcome.
//!
//! All continuations of one pipeline run share a single "highest depth
//! entered" counter. Entering a depth at or below it is the signature of a
//! `Next` run twice, which fails with
//! [`ErrorKind::NextCalledTwice`](crate::ErrorKind::NextCalledTwice).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{BoxFuture, BoxedHandler, Handler};

/// Builds a single pipeline from `handlers`, in iteration order.
pub fn compose<I>(handlers: I) -> Pipeline
where
    I: IntoIterator<Item = BoxedHandler>,
{
    Pipeline { handlers: handlers.into_iter().collect() }
}

/// The composed entry point.
///
/// A `Pipeline` is itself a [`Handler`]: nested inside another pipeline, the
/// outer `next` runs once the inner chain is exhausted.
pub struct Pipeline {
    handlers: Vec<BoxedHandler>,
}

impl Pipeline {
    /// Runs the whole chain against `ctx`, with no final continuation.
    pub fn run<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        self.run_with(ctx, None)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn run_with<'a>(
        &'a self,
        ctx: &'a mut Context,
        tail: Option<Next<'a>>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // Fresh counter per run: concurrent requests never share it.
            let entered = AtomicUsize::new(0);
            let first = Next {
                handlers: &self.handlers,
                depth: 0,
                entered: &entered,
                tail: tail.as_ref(),
            };
            first.run(ctx).await
        })
    }
}

impl Handler for Pipeline {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        self.run_with(ctx, Some(next))
    }
}

/// The continuation handed to a handler: runs everything nested inside it.
///
/// `Next` is `Copy`, so running it twice compiles; it fails at runtime with
/// [`ErrorKind::NextCalledTwice`](crate::ErrorKind::NextCalledTwice) and
/// nothing deeper runs a second time.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [BoxedHandler],
    depth: usize,
    /// Highest depth entered so far, plus one. Never decreases.
    entered: &'a AtomicUsize,
    tail: Option<&'a Next<'a>>,
}

impl<'a> Next<'a> {
    /// Runs the handler at this depth and, through it, the rest of the chain.
    ///
    /// Resolves once the whole nested sub-chain has settled. Panics raised by
    /// a handler, whether while building its future or while it is polled,
    /// come back as `Err`.
    pub fn run<'b>(&'b self, ctx: &'b mut Context) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let depth = self.depth;
            if depth < self.entered.load(Ordering::Acquire) {
                return Err(Error::next_called_twice());
            }
            self.entered.store(depth + 1, Ordering::Release);

            match self.handlers.get(depth) {
                Some(handler) => {
                    let next = Next { depth: depth + 1, ..*self };
                    invoke(handler.as_ref(), ctx, next).await
                }
                None => match self.tail {
                    Some(tail) if depth == self.handlers.len() => tail.run(ctx).await,
                    _ => Ok(()),
                },
            }
        })
    }

    /// Depth of the handler this continuation enters.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

async fn invoke<'a>(handler: &'a dyn Handler, ctx: &'a mut Context, next: Next<'a>) -> Result<()> {
    // The `&mut` leaves the slot exactly once.
    let mut slot = Some(ctx);
    let built = panic::catch_unwind(AssertUnwindSafe(|| {
        slot.take().map(|ctx| handler.call(ctx, next))
    }));
    let fut = match built {
        Ok(Some(fut)) => fut,
        Ok(None) => return Err(Error::new("handler invoked without a context")),
        Err(payload) => return Err(Error::from_panic(payload)),
    };
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::Method;

    use super::*;
    use crate::ErrorKind;
    use crate::context::Context;
    use crate::handler::handler_fn;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Logs `{name}:in` before and `{name}:out` after its continuation.
    fn layer(name: &'static str, log: &Log) -> BoxedHandler {
        let log = Arc::clone(log);
        handler_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name}:in"));
                let outcome = next.run(ctx).await;
                log.lock().unwrap().push(format!("{name}:out"));
                outcome
            })
        })
        .boxed()
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn unwinds_in_reverse_registration_order() {
        let log = Log::default();
        let pipeline = compose(["a", "b", "c"].map(|name| layer(name, &log)));
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(entries(&log), ["a:in", "b:in", "c:in", "c:out", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn handler_that_skips_next_ends_the_chain() {
        let log = Log::default();
        let stop = handler_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.set_body("stopped");
                Err(Error::http(418, "short and stout"))
            })
        });
        let pipeline = compose([layer("a", &log), stop.boxed(), layer("never", &log)]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        let err = pipeline.run(&mut ctx).await.unwrap_err();

        assert_eq!(err.status(), Some(418));
        assert_eq!(entries(&log), ["a:in", "a:out"]);
    }

    #[tokio::test]
    async fn running_next_twice_is_rejected() {
        let log = Log::default();
        let twice = handler_fn(|ctx, next| {
            Box::pin(async move {
                next.run(ctx).await?;
                next.run(ctx).await
            })
        });
        let pipeline = compose([twice.boxed(), layer("inner", &log)]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        let err = pipeline.run(&mut ctx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NextCalledTwice);
        assert_eq!(entries(&log), ["inner:in", "inner:out"]);
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let sync_panic = handler_fn(|_ctx, _next| panic!("before the future exists"));
        let async_panic = handler_fn(|_ctx, _next| Box::pin(async move { panic!("while polled") }));
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        let err = compose([sync_panic.boxed()]).run(&mut ctx).await.unwrap_err();
        assert_eq!((err.kind(), err.message()), (ErrorKind::Panic, "before the future exists"));

        let err = compose([async_panic.boxed()]).run(&mut ctx).await.unwrap_err();
        assert_eq!((err.kind(), err.message()), (ErrorKind::Panic, "while polled"));
    }

    #[tokio::test]
    async fn nested_pipeline_continues_into_outer_chain() {
        let log = Log::default();
        let inner = compose([layer("x", &log), layer("y", &log)]);
        let pipeline = compose([layer("a", &log), inner.boxed(), layer("z", &log)]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(
            entries(&log),
            ["a:in", "x:in", "y:in", "z:in", "z:out", "y:out", "x:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn empty_pipeline_settles_ok() {
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");
        assert!(compose(Vec::new()).run(&mut ctx).await.is_ok());
    }
}

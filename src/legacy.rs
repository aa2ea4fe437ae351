//! Adapter for stepwise handlers.
//!
//! Older code split a handler in two halves around the point where it
//! yielded to the rest of the chain. [`Legacy`] keeps that shape, and
//! [`convert`] turns it into an ordinary [`Handler`]:
//!
//! ```text
//! before(ctx) ─ Continue ─▶ next.run(ctx) ─▶ after(ctx)
//!      └─────── Stop ─────▶ (chain ends here, `after` is skipped)
//! ```
//!
//! New code should implement [`Handler`] directly. Registering through
//! [`App::register_legacy`](crate::App::register_legacy) logs a
//! deprecation warning.

use crate::compose::Next;
use crate::context::Context;
use crate::error::Result;
use crate::handler::{BoxFuture, Handler};

/// What a stepwise handler wants once its first half has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Run the rest of the chain, then `after`.
    Continue,
    /// End the chain here.
    Stop,
}

pub trait Legacy: Send + Sync + 'static {
    fn before(&self, ctx: &mut Context) -> Result<Step>;

    fn after(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }
}

/// A [`Legacy`] handler wrapped as a [`Handler`].
#[derive(Debug)]
pub struct Converted<L>(L);

pub fn convert<L: Legacy>(handler: L) -> Converted<L> {
    Converted(handler)
}

impl<L: Legacy> Handler for Converted<L> {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.0.before(ctx)? == Step::Stop {
                return Ok(());
            }
            next.run(ctx).await?;
            self.0.after(ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::{Method, StatusCode};

    use super::*;
    use crate::compose::compose;
    use crate::error::Error;
    use crate::handler::handler_fn;

    struct Gate {
        open: bool,
        after_runs: AtomicUsize,
    }

    impl Legacy for Gate {
        fn before(&self, ctx: &mut Context) -> Result<Step> {
            if self.open {
                return Ok(Step::Continue);
            }
            ctx.set_status(StatusCode::FORBIDDEN);
            Ok(Step::Stop)
        }

        fn after(&self, ctx: &mut Context) -> Result<()> {
            self.after_runs.fetch_add(1, Ordering::SeqCst);
            ctx.set_header("x-gate", "passed")
        }
    }

    fn inner() -> impl Handler {
        handler_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.set_body("inner");
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn continue_wraps_the_rest_of_the_chain() {
        let gate = std::sync::Arc::new(convert(Gate { open: true, after_runs: AtomicUsize::new(0) }));
        let pipeline = compose([gate.clone() as crate::BoxedHandler, inner().boxed()]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.status(), StatusCode::OK);
        assert_eq!(ctx.response().header("x-gate").unwrap(), "passed");
        assert_eq!(gate.0.after_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_skips_next_and_after() {
        let gate = std::sync::Arc::new(convert(Gate { open: false, after_runs: AtomicUsize::new(0) }));
        let pipeline = compose([gate.clone() as crate::BoxedHandler, inner().boxed()]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        pipeline.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.status(), StatusCode::FORBIDDEN);
        assert!(ctx.body().is_none());
        assert_eq!(gate.0.after_runs.load(Ordering::SeqCst), 0);
    }

    struct Failing;

    impl Legacy for Failing {
        fn before(&self, _ctx: &mut Context) -> Result<Step> {
            Err(Error::http(401, "token expired"))
        }
    }

    #[tokio::test]
    async fn errors_propagate_like_any_handler() {
        let pipeline = compose([convert(Failing).boxed()]);
        let (mut ctx, _pending) = Context::for_test(Method::GET, "/");

        let err = pipeline.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.expose());
    }
}

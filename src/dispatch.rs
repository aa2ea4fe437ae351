//! Runs the pipeline for one request and routes its outcome.
//!
//! Exactly one of two things happens per context: the responder flushes
//! the staged response, or the error sink reports a failure. Which one is
//! decided after the pipeline settles:
//!
//! | Connection | Pipeline | Route |
//! |---|---|---|
//! | aborted | any | `on_error(aborted)` |
//! | open or finished | `Err(e)` | `on_error(e)` |
//! | open or finished | `Ok` | `respond` |
//!
//! The abort check covers the whole request: an abort seen while handlers
//! run, and one that happened before the pipeline was first polled or
//! after it settled.
//!
//! An abort does not cancel the pipeline. Handlers keep running to
//! completion and are expected to check [`Context::writable`] before
//! writing on their own.

use http::StatusCode;
use tracing::debug;

use crate::compose::Pipeline;
use crate::context::Context;
use crate::error::Error;
use crate::respond::respond;
use crate::transport::Lifecycle;

pub(crate) async fn dispatch(ctx: &mut Context, pipeline: &Pipeline) {
    // A pipeline that never sets a status answers 404.
    ctx.raw_mut().set_status(StatusCode::NOT_FOUND);

    let closed = ctx.response().raw().closed();
    tokio::pin!(closed);

    let mut terminated = None;
    let outcome = {
        let mut run = pipeline.run(ctx);
        loop {
            tokio::select! {
                biased;

                outcome = &mut run => break outcome,

                state = &mut closed, if terminated.is_none() => terminated = Some(state),
            }
        }
    };

    // The select only sees an abort while the pipeline is pending.
    let state = match terminated {
        Some(Lifecycle::Aborted) => Lifecycle::Aborted,
        _ => ctx.response().raw().lifecycle(),
    };
    let aborted = state == Lifecycle::Aborted;

    match (aborted, outcome) {
        (true, _) => ctx.on_error(Error::aborted()),
        (false, Ok(())) => respond(ctx),
        (false, Err(err)) => ctx.on_error(err),
    }

    debug!(
        method = %ctx.method(),
        path = ctx.path(),
        status = ctx.status().as_u16(),
        aborted,
        "request settled"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::Method;
    use tokio::sync::Notify;

    use super::*;
    use crate::app::App;
    use crate::compose::compose;
    use crate::handler::{Handler, handler_fn};
    use crate::transport;
    use crate::ErrorKind;

    #[tokio::test]
    async fn default_status_is_not_found() {
        let (mut ctx, pending) = Context::for_test(Method::GET, "/");
        dispatch(&mut ctx, &compose(Vec::new())).await;
        assert_eq!(pending.response().await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn abort_routes_to_error_sink_after_pipeline_finishes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = {
            let seen = Arc::clone(&seen);
            App::default().on_failure(move |err, _ctx| {
                seen.lock().unwrap().push((err.kind(), err.headers_sent()));
            })
        };

        let release = Arc::new(Notify::new());
        let slow = {
            let release = Arc::clone(&release);
            handler_fn(move |ctx, _next| {
                let release = Arc::clone(&release);
                Box::pin(async move {
                    release.notified().await;
                    ctx.set_body("too late");
                    Ok(())
                })
            })
        };
        let pipeline = compose([slow.boxed()]);

        let (raw, pending) = transport::channel();
        let closed = raw.closed();
        let req = http::Request::get("/").body(transport::empty()).unwrap();
        let mut ctx = Context::new(Arc::new(app), req, raw);

        let task = tokio::spawn(async move {
            dispatch(&mut ctx, &pipeline).await;
            ctx
        });
        drop(pending);
        assert_eq!(closed.await, Lifecycle::Aborted);
        release.notify_one();

        let ctx = task.await.unwrap();
        assert!(matches!(ctx.body(), Some(crate::Body::Text(t)) if t == "too late"));
        assert!(!ctx.headers_sent());
        assert_eq!(*seen.lock().unwrap(), [(ErrorKind::Aborted, true)]);
    }

    #[tokio::test]
    async fn abort_before_first_poll_is_still_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = {
            let seen = Arc::clone(&seen);
            App::default().on_failure(move |err, _ctx| {
                seen.lock().unwrap().push((err.kind(), err.headers_sent()));
            })
        };
        let instant = handler_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.set_body("nobody reads this");
                Ok(())
            })
        });

        let (raw, pending) = transport::channel();
        let req = http::Request::get("/").body(transport::empty()).unwrap();
        let mut ctx = Context::new(Arc::new(app), req, raw);
        drop(pending);
        assert_eq!(ctx.response().raw().lifecycle(), Lifecycle::Aborted);

        dispatch(&mut ctx, &compose([instant.boxed()])).await;

        assert!(!ctx.headers_sent());
        assert_eq!(*seen.lock().unwrap(), [(ErrorKind::Aborted, true)]);
    }

    #[tokio::test]
    async fn finished_by_handler_is_not_an_abort() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = {
            let seen = Arc::clone(&seen);
            App::default().on_failure(move |err, _ctx| seen.lock().unwrap().push(err.kind()))
        };
        let manual = handler_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.set_respond(false);
                ctx.raw_mut().set_status(StatusCode::ACCEPTED);
                ctx.raw_mut().end(transport::full("by hand"));
                Ok(())
            })
        });

        let (raw, pending) = transport::channel();
        let req = http::Request::get("/").body(transport::empty()).unwrap();
        let mut ctx = Context::new(Arc::new(app), req, raw);

        dispatch(&mut ctx, &compose([manual.boxed()])).await;

        assert_eq!(ctx.response().raw().lifecycle(), Lifecycle::Finished);
        assert_eq!(pending.response().await.status(), StatusCode::ACCEPTED);
        assert!(seen.lock().unwrap().is_empty());
    }
}

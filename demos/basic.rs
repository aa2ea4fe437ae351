//! Minimal strata example: an onion of handlers in front of a tiny JSON API.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -i http://localhost:3000/missing
//!   curl -i http://localhost:3000/boom

use std::time::Instant;

use http::StatusCode;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use strata::{App, BoxFuture, Config, Context, Error, Next, Result, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    App::new(Config::from_env())
        .register(middleware::trace())
        .register(response_time)
        .register(api)
        .on_failure(|err, ctx| {
            if !err.expose() {
                tracing::error!(path = ctx.path(), error = %err, "unhandled");
            }
        })
        .listen("0.0.0.0:3000")
        .await
}

// Runs around everything registered after it.
fn response_time<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let started = Instant::now();
        next.run(ctx).await?;
        let elapsed = format!("{}ms", started.elapsed().as_millis());
        ctx.set_header("x-response-time", elapsed)?;
        Ok(())
    })
}

fn api<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let method = ctx.method().clone();
        let path = ctx.path().to_owned();

        match (method.as_str(), path.as_str()) {
            ("GET", "/boom") => panic!("handler bug"),
            ("GET", p) if p.starts_with("/users/") => {
                let id = &p["/users/".len()..];
                ctx.set_body(json!({ "id": id, "name": "alice" }));
            }
            ("POST", "/users") => {
                let input = read_json(ctx).await?;
                let name = input["name"].as_str().ok_or_else(|| Error::http(422, "name is required"))?;
                ctx.set_status(StatusCode::CREATED);
                ctx.set_header("location", "/users/99")?;
                ctx.set_body(json!({ "id": "99", "name": name }));
            }
            // Nothing set: the responder answers 404.
            _ => {}
        }
        Ok(())
    })
}

async fn read_json(ctx: &mut Context) -> Result<Value> {
    let body = ctx
        .request_mut()
        .take_body()
        .ok_or_else(|| Error::http(400, "body already consumed"))?;
    let bytes = body
        .collect()
        .await
        .map_err(|e| Error::http(400, "unreadable body").with_source(e))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| Error::http(400, "invalid JSON").with_source(e))
}

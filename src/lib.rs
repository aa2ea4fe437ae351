//! # strata
//!
//! The middleware core of a minimal HTTP framework. An [`App`] is an ordered
//! list of handlers composed into an onion: each handler runs some code,
//! awaits the rest of the chain through [`Next::run`], then runs some more
//! on the way back out.
//!
//! ## What strata owns
//!
//! - Composition: ordered handlers, LIFO unwind, short-circuiting, and a
//!   rejected second call to `next`
//! - A per-request [`Context`] with request/response views and typed state
//! - The responder: turning the staged body into exactly one write
//! - The error sink: every failure, including panics inside handlers,
//!   reported to observers and answered with a status and a safe message
//!
//! Routing, body parsing, and sessions are left to handlers.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{App, BoxFuture, Context, Error, Next, Result, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     App::default()
//!         .register(middleware::trace())
//!         .register(hello)
//!         .listen("0.0.0.0:3000")
//!         .await
//! }
//!
//! fn hello<'a>(ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, Result<()>> {
//!     Box::pin(async move {
//!         if ctx.path() != "/" {
//!             return Err(Error::http(404, "nothing here"));
//!         }
//!         ctx.set_body("hello");
//!         Ok(())
//!     })
//! }
//! ```

mod app;
mod compose;
mod config;
mod context;
mod dispatch;
mod error;
mod handler;
mod legacy;
mod request;
mod respond;
mod response;
mod server;

pub mod middleware;
pub mod status;
pub mod transport;

pub use app::{App, Callback, Observer};
pub use compose::{Next, Pipeline, compose};
pub use config::Config;
pub use context::{Context, CookieOptions, Cookies};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use handler::{BoxFuture, BoxedHandler, Handler, handler_fn};
pub use legacy::{Converted, Legacy, Step, convert};
pub use request::Request;
pub use response::{Body, BodyStream, Response};
pub use server::Server;
pub use transport::{HttpBody, Lifecycle, Pending, RawResponse};

//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server:
//! 1. Stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! A request whose connection drops mid-flight is not cancelled. Its
//! pipeline runs to the end and the abort is reported through the error
//! sink, see [`Callback::call`].

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::app::Callback;
use crate::error::Result;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use strata::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Starts accepting connections and hands every request to `callback`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing). Failing to bind is
    /// an [`ErrorKind::Io`](crate::ErrorKind::Io) error.
    pub async fn serve(self, callback: Callback) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, env = %callback.app().config().env, "strata listening");

        // Every connection task, so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();
        let mut accepted: u64 = 0;

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first: a SIGTERM stops accepting even when more
                // connections are queued.
                biased;

                signal = &mut shutdown => {
                    info!(
                        signal = signal.as_str(),
                        in_flight = tasks.len(),
                        "strata draining connections"
                    );
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    accepted += 1;

                    let callback = callback.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        debug!(peer = %remote_addr, "connection accepted");

                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let callback = callback.clone();
                            async move { Ok::<_, Infallible>(callback.call(req).await) }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!(accepted, "strata stopped");
        Ok(())
    }
}

/// The signal that ended [`Server::serve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shutdown {
    /// SIGINT, usually Ctrl-C during local runs.
    Interrupt,
    /// SIGTERM, sent by process supervisors before a hard kill.
    Terminate,
}

impl Shutdown {
    fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// Resolves with whichever of SIGINT or SIGTERM arrives first. Only SIGINT
/// exists off Unix.
async fn wait_for_shutdown() -> Shutdown {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
        Shutdown::Interrupt
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        Shutdown::Terminate
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Shutdown>();

    tokio::select! {
        signal = interrupt => signal,
        signal = terminate => signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signals_log_their_names() {
        assert_eq!(Shutdown::Interrupt.as_str(), "SIGINT");
        assert_eq!(Shutdown::Terminate.as_str(), "SIGTERM");
    }

    #[test]
    fn from_addr_keeps_the_address() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(Server::from_addr(addr).addr, addr);
    }
}

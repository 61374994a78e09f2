//! # Breakwater Server
//!
//! Lifecycle supervision for a hyper-based HTTP server:
//!
//! - A keep-alive-aware TCP listener, so a server behind an intermediary
//!   with a long idle-connection timeout is not dropped prematurely
//! - A coordinated graceful-shutdown protocol that distinguishes "drained
//!   cleanly" from "the deadline expired with work still in flight"
//! - Lock-guarded liveness/readiness gates exposed as HTTP status codes
//!
//! ## Example
//!
//! ```rust,ignore
//! use breakwater_server::process;
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::Full;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), breakwater_server::ServerError> {
//!     process::listen_and_serve("0.0.0.0:8080", |_req: Request<Bytes>| async {
//!         Response::new(Full::new(Bytes::from_static(b"hello")))
//!     })
//!     .await
//! }
//! ```
//!
//! For manual wiring — custom signal sources, programmatic shutdown, or
//! tests — build a [`Server`] directly and supervise it with a
//! [`ShutdownCoordinator`]:
//!
//! ```rust,ignore
//! let server = Server::new(config, handler);
//! let listener = server.bind("127.0.0.1:0").await?;
//! let (trigger, requests) = shutdown::channel();
//! // trigger.trigger() from wherever shutdown is decided.
//! server.serve_with_shutdown(listener, requests).await
//! ```

#![doc(html_root_url = "https://docs.rs/breakwater-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod handler;
pub mod listener;
pub mod process;
pub mod server;
pub mod shutdown;
pub mod status;

mod tls;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use handler::{Handler, HandlerFuture, ResponseBody};
pub use listener::KeepAliveListener;
pub use process::{
    listen_and_serve, listen_and_serve_tls, listen_and_serve_tls_with_config,
    listen_and_serve_with_config, GatedHandler,
};
pub use server::{Server, ServerError};
pub use shutdown::{ShutdownCoordinator, ShutdownRequests, ShutdownTrigger};
pub use status::StatusGate;

//! # Breakwater
//!
//! **Supervised HTTP serving for long-lived deployments**
//!
//! Breakwater wraps a hyper-based server with the two behaviors a process
//! behind a load balancer actually needs from its lifecycle:
//!
//! - **Keep-alive-aware listening** – every accepted connection gets TCP
//!   keep-alive probing with a configurable period, so an intermediary
//!   with a long idle-session timeout never reuses a connection the
//!   server already abandoned
//! - **Coordinated graceful shutdown** – one protocol that stops
//!   accepting, drains in-flight work, and tells you honestly whether the
//!   drain finished or the deadline expired with connections still open
//! - **Status gates** – lock-guarded liveness/readiness flags served as
//!   bare HTTP status codes for supervisors and balancers to poll
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breakwater::prelude::*;
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::Full;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     listen_and_serve("0.0.0.0:8080", |_req: Request<Bytes>| async {
//!         Response::new(Full::new(Bytes::from_static(b"hello")))
//!     })
//!     .await
//! }
//! ```
//!
//! Deployments behind the Google Cloud Load Balancer should start from
//! the matching preset:
//!
//! ```rust
//! use breakwater::prelude::*;
//!
//! let config = ServerConfig::builder()
//!     .behind_google_cloud_load_balancer()
//!     .build();
//! ```

#![doc(html_root_url = "https://docs.rs/breakwater/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the server implementation
pub use breakwater_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use breakwater::prelude::*;
///
/// let config = ServerConfig::default();
/// ```
pub mod prelude {
    pub use breakwater_server::{
        listen_and_serve, listen_and_serve_tls, listen_and_serve_tls_with_config,
        listen_and_serve_with_config, shutdown, GatedHandler, Handler, KeepAliveListener, Server,
        ServerConfig, ServerError, ShutdownCoordinator, ShutdownTrigger, StatusGate,
    };
}

//! Process-level wiring: signals, gates, and the one-call entry points.
//!
//! This is the outermost collaborator around the core: it owns the
//! conventions a deployed process needs — a liveness gate that goes "ok"
//! immediately, a readiness gate that goes "ok" only once the listener is
//! bound and serving and "not ok" the instant a shutdown request is
//! observed, and the translation of SIGTERM / SIGINT into exactly one
//! shutdown request. Nothing below this module registers signal handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! use breakwater_server::process;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), breakwater_server::ServerError> {
//!     process::listen_and_serve("0.0.0.0:8080", |req| async move {
//!         // ... build a response ...
//!     })
//!     .await
//! }
//! ```

use crate::config::ServerConfig;
use crate::handler::{Handler, HandlerFuture};
use crate::server::{Server, ServerError};
use crate::shutdown::{self, ShutdownTrigger};
use crate::status::StatusGate;

use std::path::Path;

use bytes::Bytes;
use http::{Method, Request};

/// Serves `handler` at `addr` with default configuration until an OS
/// shutdown signal arrives, then drains gracefully.
pub async fn listen_and_serve(addr: &str, handler: impl Handler) -> Result<(), ServerError> {
    listen_and_serve_with_config(addr, ServerConfig::default(), handler).await
}

/// Serves `handler` at `addr` with the given configuration until an OS
/// shutdown signal arrives, then drains gracefully.
pub async fn listen_and_serve_with_config(
    addr: &str,
    config: ServerConfig,
    handler: impl Handler,
) -> Result<(), ServerError> {
    let wiring = Wiring::new(config, handler);
    let listener = wiring.server.bind(addr).await?;
    let requests = wiring.arm();
    wiring.server.serve_with_shutdown(listener, requests).await
}

/// TLS variant of [`listen_and_serve`].
pub async fn listen_and_serve_tls(
    addr: &str,
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    handler: impl Handler,
) -> Result<(), ServerError> {
    listen_and_serve_tls_with_config(addr, cert_path, key_path, ServerConfig::default(), handler)
        .await
}

/// TLS variant of [`listen_and_serve_with_config`].
pub async fn listen_and_serve_tls_with_config(
    addr: &str,
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    config: ServerConfig,
    handler: impl Handler,
) -> Result<(), ServerError> {
    let wiring = Wiring::new(config, handler);
    let listener = wiring.server.bind(addr).await?;
    let requests = wiring.arm();
    wiring
        .server
        .serve_tls_with_shutdown(listener, cert_path, key_path, requests)
        .await
}

/// Gates plus server, assembled but not yet armed.
struct Wiring {
    server: Server,
    ready: StatusGate,
}

impl Wiring {
    fn new(config: ServerConfig, handler: impl Handler) -> Self {
        let healthy = StatusGate::with_codes(config.status_ok_code(), config.status_not_ok_code());
        let ready = StatusGate::with_codes(config.status_ok_code(), config.status_not_ok_code());

        // Alive as soon as the process is wired; ready only once bound.
        healthy.set_ok();

        let handler = GatedHandler::new(handler, healthy, ready.clone(), &config);
        let server = Server::new(config, handler);

        Self { server, ready }
    }

    /// Marks the process ready and installs the signal-to-shutdown
    /// translation. Returns the request channel for the coordinator.
    fn arm(&self) -> shutdown::ShutdownRequests {
        let (trigger, requests) = shutdown::channel();
        spawn_signal_listener(trigger, self.ready.clone());
        self.ready.set_ok();
        requests
    }
}

/// Wraps a handler so the health and ready routes answer from the gates.
///
/// `GET` on the configured health or ready route (defaults `/health` and
/// `/ready`) returns the gate's status code with an empty body; everything
/// else is delegated to the wrapped handler untouched.
pub struct GatedHandler {
    inner: Box<dyn Handler>,
    healthy: StatusGate,
    ready: StatusGate,
    health_route: String,
    ready_route: String,
}

impl GatedHandler {
    /// Wraps `inner`, routing the configured probe paths to the gates.
    #[must_use]
    pub fn new(
        inner: impl Handler,
        healthy: StatusGate,
        ready: StatusGate,
        config: &ServerConfig,
    ) -> Self {
        Self {
            inner: Box::new(inner),
            healthy,
            ready,
            health_route: config.health_route().to_string(),
            ready_route: config.ready_route().to_string(),
        }
    }
}

impl Handler for GatedHandler {
    fn handle(&self, req: Request<Bytes>) -> HandlerFuture {
        if req.method() == Method::GET {
            let path = req.uri().path();
            if path == self.health_route {
                let response = self.healthy.response();
                return Box::pin(async move { response });
            }
            if path == self.ready_route {
                let response = self.ready.response();
                return Box::pin(async move { response });
            }
        }
        self.inner.handle(req)
    }
}

/// Installs the signal task: on SIGTERM / SIGINT, flip readiness off and
/// send the one shutdown request.
fn spawn_signal_listener(trigger: ShutdownTrigger, ready: StatusGate) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        // Stop advertising readiness before the drain begins, so the
        // balancer routes no new traffic at connections about to wind
        // down.
        ready.set_not_ok();
        trigger.trigger();
    });
}

/// Waits for an OS shutdown signal.
///
/// On Unix this is SIGTERM or SIGINT; elsewhere, Ctrl+C.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, requesting graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, requesting graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to wait for Ctrl+C");
        tracing::info!("received Ctrl+C, requesting graceful shutdown");
    }
}

//! The managed HTTP server.
//!
//! [`Server`] owns a serving engine (hyper's HTTP/1 connection driver) and
//! supervises its lifecycle: it binds the listener, runs the accept loop,
//! applies the configured timeout thresholds, and exposes the two ways out
//! of serving — an immediate [`close`](Server::close) and a draining
//! [`shutdown_with_deadline`](Server::shutdown_with_deadline). Request
//! semantics beyond that (routing, body interpretation, middleware) belong
//! to the [`Handler`] the server was built with.
//!
//! # Example
//!
//! ```rust,ignore
//! use breakwater_server::{Server, ServerConfig};
//!
//! let server = Server::new(ServerConfig::default(), my_handler);
//! let listener = server.bind("0.0.0.0:8080").await?;
//! server.serve(listener).await
//! ```

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::handler::{status_response, Handler, ResponseBody};
use crate::listener::KeepAliveListener;
use crate::shutdown::{
    self, ConnectionTracker, ShutdownCoordinator, ShutdownRequests, ShutdownSignal,
};
use crate::tls;

/// Errors produced by serving and shutting down.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be opened. Fatal and never retried.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying listen failure.
        #[source]
        source: io::Error,
    },

    /// Certificate or key material was unreadable or invalid. Surfaced at
    /// `serve_tls` invocation, before any connection is accepted.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(String),

    /// The sentinel: serving concluded because the listener was shut down
    /// deliberately. Not a fault.
    #[error("server closed")]
    Closed,

    /// The drain deadline elapsed inside `shutdown_with_deadline`. The
    /// coordinator converts this into [`ServerError::UncleanShutdown`]
    /// before callers see it.
    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,

    /// Graceful shutdown ended with connections still open at the
    /// deadline. Distinguished from a raw timeout so callers can branch on
    /// it by name.
    #[error("unclean shutdown: connections still open at the deadline")]
    UncleanShutdown,

    /// A fatal fault from the running serve loop, unrelated to shutdown.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Returns whether this is the deliberate-close sentinel.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

type ShutdownHook = Box<dyn Fn() + Send + Sync>;

/// A request-serving engine wrapped with lifecycle supervision.
///
/// Cheap to clone; clones share the same shutdown state, so one clone can
/// run [`serve`](Self::serve) while another calls
/// [`close`](Self::close) or
/// [`shutdown_with_deadline`](Self::shutdown_with_deadline).
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    handler: Arc<dyn Handler>,
    state: Arc<ServeState>,
}

struct ServeState {
    /// Trips when a graceful shutdown begins: stop accepting, wind down
    /// connections after their in-flight request.
    shutdown: ShutdownSignal,
    /// Trips on `close()`: stop accepting and drop connections outright.
    close: ShutdownSignal,
    tracker: ConnectionTracker,
    local_addr: RwLock<Option<SocketAddr>>,
    keep_alives: AtomicBool,
    on_shutdown: Mutex<Vec<ShutdownHook>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("active_connections", &self.state.tracker.active_connections())
            .field("shutting_down", &self.state.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server from a configuration and a request handler.
    #[must_use]
    pub fn new(config: ServerConfig, handler: impl Handler) -> Self {
        Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            state: Arc::new(ServeState {
                shutdown: ShutdownSignal::new(),
                close: ShutdownSignal::new(),
                tracker: ConnectionTracker::new(),
                local_addr: RwLock::new(None),
                keep_alives: AtomicBool::new(true),
                on_shutdown: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the resolved listen address, once bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.state.local_addr.read()
    }

    /// Registers a function to run when graceful shutdown begins.
    ///
    /// Hooks run synchronously, once, on the first shutdown trigger, in
    /// registration order; keep them quick.
    pub fn register_on_shutdown(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.on_shutdown.lock().push(Box::new(hook));
    }

    /// Enables or disables HTTP keep-alive for connections accepted from
    /// now on. Enabled by default.
    pub fn set_keep_alives_enabled(&self, enabled: bool) {
        self.state.keep_alives.store(enabled, Ordering::SeqCst);
    }

    /// Returns whether HTTP keep-alive is enabled for new connections.
    #[must_use]
    pub fn keep_alives_enabled(&self) -> bool {
        self.state.keep_alives.load(Ordering::SeqCst)
    }

    /// Opens the listening socket at `addr` and wraps it with the
    /// configured keep-alive probe period.
    ///
    /// An empty port (trailing `:`) or port `0` requests an OS-assigned
    /// ephemeral port; an empty host binds all interfaces. The resolved
    /// address is recorded and queryable via
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(&self, addr: &str) -> Result<KeepAliveListener, ServerError> {
        let target = normalize_addr(addr);
        let listener =
            TcpListener::bind(target.as_ref())
                .await
                .map_err(|source| ServerError::Bind {
                    addr: addr.to_string(),
                    source,
                })?;
        let local = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        *self.state.local_addr.write() = Some(local);

        Ok(KeepAliveListener::new(
            listener,
            self.config.keep_alive_period(),
        ))
    }

    /// Runs the accept-dispatch loop until the server is shut down or a
    /// fatal accept error occurs.
    ///
    /// Blocks the calling task for its entire lifetime; callers that need
    /// to observe other events must spawn it. Concludes with the
    /// [`ServerError::Closed`] sentinel when [`close`](Self::close) or
    /// [`shutdown_with_deadline`](Self::shutdown_with_deadline) ended the
    /// loop.
    pub async fn serve(&self, listener: KeepAliveListener) -> Result<(), ServerError> {
        self.serve_inner(listener, None).await
    }

    /// Like [`serve`](Self::serve), additionally performing a TLS
    /// handshake per accepted connection.
    ///
    /// Certificate and key material is loaded from the given PEM files at
    /// invocation time; unusable material fails fast with
    /// [`ServerError::TlsConfig`]. A failed handshake ends only that
    /// connection, not the loop.
    pub async fn serve_tls(
        &self,
        listener: KeepAliveListener,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<(), ServerError> {
        let acceptor = tls::acceptor(cert_path.as_ref(), key_path.as_ref())?;
        self.serve_inner(listener, Some(acceptor)).await
    }

    /// Runs [`serve`](Self::serve) on a spawned task and supervises it
    /// with a [`ShutdownCoordinator`] fed from `requests`.
    ///
    /// Returns the coordinator's single final outcome: `Ok(())` for a
    /// requested shutdown that drained cleanly, otherwise the first fault
    /// or [`ServerError::UncleanShutdown`].
    pub async fn serve_with_shutdown(
        &self,
        listener: KeepAliveListener,
        requests: ShutdownRequests,
    ) -> Result<(), ServerError> {
        let (result_tx, results) = shutdown::result_channel();
        let server = self.clone();
        tokio::spawn(async move {
            let _ = result_tx.send(server.serve(listener).await).await;
        });

        ShutdownCoordinator::new(
            self.clone(),
            results,
            requests,
            self.config.shutdown_timeout(),
        )
        .run()
        .await
    }

    /// TLS variant of [`serve_with_shutdown`](Self::serve_with_shutdown).
    pub async fn serve_tls_with_shutdown(
        &self,
        listener: KeepAliveListener,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        requests: ShutdownRequests,
    ) -> Result<(), ServerError> {
        let (result_tx, results) = shutdown::result_channel();
        let server = self.clone();
        let cert_path = cert_path.as_ref().to_owned();
        let key_path = key_path.as_ref().to_owned();
        tokio::spawn(async move {
            let _ = result_tx
                .send(server.serve_tls(listener, cert_path, key_path).await)
                .await;
        });

        ShutdownCoordinator::new(
            self.clone(),
            results,
            requests,
            self.config.shutdown_timeout(),
        )
        .run()
        .await
    }

    /// Immediately stops accepting and drops every connection.
    ///
    /// In-flight request handling may observe connection resets. Does not
    /// wait for anything; a concurrent [`serve`](Self::serve) call returns
    /// its [`ServerError::Closed`] sentinel as a side effect.
    pub fn close(&self) {
        tracing::info!("closing server");
        self.state.close.trigger();
    }

    /// Begins graceful shutdown and waits for in-flight connections to
    /// drain, up to `deadline`.
    ///
    /// Stops the accept loop, lets each connection finish its in-flight
    /// request, and returns `Ok(())` once everything has drained. When the
    /// deadline elapses first, returns [`ServerError::DeadlineExceeded`]
    /// and stops waiting; stragglers are not force-closed — escalation,
    /// if wanted, is the caller's call via [`close`](Self::close).
    pub async fn shutdown_with_deadline(&self, deadline: Duration) -> Result<(), ServerError> {
        if self.state.shutdown.trigger() {
            let hooks = self.state.on_shutdown.lock();
            for hook in hooks.iter() {
                hook();
            }
        }

        match tokio::time::timeout(deadline, self.state.tracker.drained()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::warn!(
                    active = self.state.tracker.active_connections(),
                    "shutdown deadline elapsed with connections still open"
                );
                Err(ServerError::DeadlineExceeded)
            }
        }
    }

    async fn serve_inner(
        &self,
        listener: KeepAliveListener,
        acceptor: Option<TlsAcceptor>,
    ) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            *self.state.local_addr.write() = Some(addr);
            tracing::info!(addr = %addr, "server listening");
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result?;
                    self.spawn_connection(stream, peer, acceptor.clone());
                }
                () = self.state.shutdown.recv() => break,
                () = self.state.close.recv() => break,
            }
        }

        // Dropping the listener is what actually stops new connections.
        drop(listener);
        tracing::info!("server stopped accepting connections");
        Err(ServerError::Closed)
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, acceptor: Option<TlsAcceptor>) {
        let token = self.state.tracker.acquire();
        let server = self.clone();

        tokio::spawn(async move {
            let result = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => server.serve_connection(tls_stream, peer).await,
                    Err(err) => {
                        tracing::debug!(peer = %peer, error = %err, "TLS handshake failed");
                        Ok(())
                    }
                },
                None => server.serve_connection(stream, peer).await,
            };

            if let Err(err) = result {
                tracing::debug!(peer = %peer, error = %err, "connection ended with error");
            }
            drop(token);
        });
    }

    /// Drives one connection to completion, enforcing the idle timeout
    /// and reacting to the shutdown and close signals.
    async fn serve_connection<I>(&self, io: I, peer: SocketAddr) -> hyper::Result<()>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        tracing::debug!(peer = %peer, "connection accepted");

        let activity = Arc::new(ConnActivity::new());
        let service = {
            let handler = Arc::clone(&self.handler);
            let config = Arc::clone(&self.config);
            let activity = Arc::clone(&activity);
            service_fn(move |req: Request<Incoming>| {
                handle_request(
                    Arc::clone(&handler),
                    Arc::clone(&config),
                    Arc::clone(&activity),
                    req,
                )
            })
        };

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_header_timeout())
            .max_buf_size(self.config.max_header_bytes())
            .keep_alive(self.keep_alives_enabled());

        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let idle_timeout = self.config.idle_timeout();
        let mut winding_down = false;
        loop {
            let idle_deadline = activity.idle_deadline(idle_timeout);
            tokio::select! {
                result = conn.as_mut() => return result,
                () = tokio::time::sleep_until(idle_deadline), if !winding_down => {
                    if activity.is_idle_for(idle_timeout) {
                        tracing::debug!(peer = %peer, "closing idle connection");
                        conn.as_mut().graceful_shutdown();
                        winding_down = true;
                    }
                }
                () = self.state.shutdown.recv(), if !winding_down => {
                    // Finish the in-flight request, then close.
                    conn.as_mut().graceful_shutdown();
                    winding_down = true;
                }
                () = self.state.close.recv() => {
                    tracing::debug!(peer = %peer, "dropping connection on close");
                    return Ok(());
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn connection_tracker(&self) -> &ConnectionTracker {
        &self.state.tracker
    }
}

/// Serves one request: collects the body under the read timeout, then runs
/// the handler under the write timeout.
async fn handle_request(
    handler: Arc<dyn Handler>,
    config: Arc<ServerConfig>,
    activity: Arc<ConnActivity>,
    req: Request<Incoming>,
) -> Result<Response<ResponseBody>, Infallible> {
    let _guard = activity.begin();

    let (parts, body) = req.into_parts();
    let body = match tokio::time::timeout(config.read_timeout(), body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "failed to read request body");
            return Ok(status_response(StatusCode::BAD_REQUEST));
        }
        Err(_) => {
            tracing::debug!("timed out reading request body");
            return Ok(status_response(StatusCode::REQUEST_TIMEOUT));
        }
    };

    let req = Request::from_parts(parts, body);
    match tokio::time::timeout(config.write_timeout(), handler.handle(req)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            tracing::debug!("timed out producing response");
            Ok(status_response(StatusCode::GATEWAY_TIMEOUT))
        }
    }
}

/// Per-connection activity record backing the idle-timeout watchdog.
struct ConnActivity {
    in_flight: AtomicUsize,
    last: Mutex<Instant>,
}

impl ConnActivity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        }
    }

    fn begin(self: Arc<Self>) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard { activity: self }
    }

    /// Next instant at which idleness should be re-checked.
    fn idle_deadline(&self, idle_timeout: Duration) -> Instant {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            Instant::now() + idle_timeout
        } else {
            *self.last.lock() + idle_timeout
        }
    }

    fn is_idle_for(&self, idle_timeout: Duration) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.last.lock().elapsed() >= idle_timeout
    }
}

struct ActivityGuard {
    activity: Arc<ConnActivity>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        // Stamp before decrementing so the watchdog never pairs a zero
        // count with a stale timestamp.
        *self.activity.last.lock() = Instant::now();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fills in the conventional empty-host and empty-port shorthands:
/// `":8080"` binds all interfaces, a trailing `:` requests an ephemeral
/// port.
fn normalize_addr(addr: &str) -> Cow<'_, str> {
    let addr = if addr.ends_with(':') {
        Cow::Owned(format!("{addr}0"))
    } else {
        Cow::Borrowed(addr)
    };
    if addr.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{addr}"))
    } else {
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    use bytes::Bytes;
    use http_body_util::Full;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::{sleep, timeout};

    fn routes(req: Request<Bytes>) -> impl Future<Output = Response<ResponseBody>> + Send {
        async move {
            if req.uri().path() == "/sleep" {
                sleep(Duration::from_secs(30)).await;
            }
            Response::new(Full::new(Bytes::from_static(b"hello")))
        }
    }

    async fn started_server(config: ServerConfig) -> (Server, SocketAddr) {
        let server = Server::new(config, routes);
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let serve_server = server.clone();
        tokio::spawn(async move { serve_server.serve(listener).await });
        (server, addr)
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_normalize_addr() {
        assert_eq!(normalize_addr("127.0.0.1:8080"), "127.0.0.1:8080");
        assert_eq!(normalize_addr("127.0.0.1:"), "127.0.0.1:0");
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_addr(":"), "0.0.0.0:0");
    }

    #[tokio::test]
    async fn test_bind_records_resolved_address() {
        let server = Server::new(ServerConfig::default(), routes);
        assert!(server.local_addr().is_none());

        let listener = server.bind("127.0.0.1:").await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.local_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_bind_error_is_surfaced_synchronously() {
        let first = Server::new(ServerConfig::default(), routes);
        let _held = first.bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap();

        let second = Server::new(ServerConfig::default(), routes);
        let err = second.bind(&taken.to_string()).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(second.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_serves_requests_then_close_yields_sentinel() {
        let server = Server::new(ServerConfig::default(), routes);
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let serve_server = server.clone();
        let serving = tokio::spawn(async move { serve_server.serve(listener).await });

        let response = get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("hello"));

        server.close();
        let result = timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ServerError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_with_no_connections_is_immediate() {
        let (server, _addr) = started_server(ServerConfig::default()).await;

        let result = timeout(
            Duration::from_secs(2),
            server.shutdown_with_deadline(Duration::from_secs(30)),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_supervised_shutdown_before_any_connection() {
        let server = Server::new(
            ServerConfig::builder()
                .shutdown_timeout(Duration::from_secs(5))
                .build(),
            routes,
        );
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        let (trigger, requests) = shutdown::channel();

        trigger.trigger();
        // A duplicate must neither block nor change the outcome.
        trigger.trigger();

        let result = timeout(
            Duration::from_secs(5),
            server.serve_with_shutdown(listener, requests),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_supervised_shutdown_with_stuck_handler_is_unclean() {
        let server = Server::new(
            ServerConfig::builder()
                .shutdown_timeout(Duration::from_secs(2))
                .build(),
            routes,
        );
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let (trigger, requests) = shutdown::channel();

        let supervised = {
            let server = server.clone();
            tokio::spawn(async move { server.serve_with_shutdown(listener, requests).await })
        };

        // Park one request in the sleeping handler and keep the
        // connection open.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /sleep HTTP/1.1\r\nhost: test\r\n\r\n")
            .await
            .unwrap();
        sleep(Duration::from_millis(300)).await;

        let started = Instant::now();
        trigger.trigger();

        let result = timeout(Duration::from_secs(10), supervised)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ServerError::UncleanShutdown)));

        // The deadline is a hard bound: not earlier, not much later.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1900), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "returned too late: {elapsed:?}");

        drop(stream);
    }

    #[tokio::test]
    async fn test_handler_overrun_reports_gateway_timeout() {
        let config = ServerConfig::builder()
            .write_timeout(Duration::from_millis(100))
            .build();
        let (_server, addr) = started_server(config).await;

        let response = get(addr, "/sleep").await;
        assert!(response.starts_with("HTTP/1.1 504"));
    }

    #[tokio::test]
    async fn test_idle_connection_is_reaped() {
        let config = ServerConfig::builder()
            .idle_timeout(Duration::from_millis(300))
            .build();
        let (_server, addr) = started_server(config).await;

        // Connect and send nothing; the watchdog should close us.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0_u8; 1];
        let read = timeout(Duration::from_secs(3), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, 0, "expected EOF from the idle reaper");
    }

    #[tokio::test]
    async fn test_on_shutdown_hooks_run_once() {
        let server = Server::new(ServerConfig::default(), routes);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        server.register_on_shutdown(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        server
            .shutdown_with_deadline(Duration::from_secs(1))
            .await
            .unwrap();
        server
            .shutdown_with_deadline(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_serve_tls_with_bad_material_fails_fast() {
        let server = Server::new(ServerConfig::default(), routes);
        let listener = server.bind("127.0.0.1:0").await.unwrap();

        let err = server
            .serve_tls(listener, "/nonexistent/cert.pem", "/nonexistent/key.pem")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::TlsConfig(_)));
    }

    #[tokio::test]
    async fn test_keep_alives_toggle() {
        let server = Server::new(ServerConfig::default(), routes);
        assert!(server.keep_alives_enabled());
        server.set_keep_alives_enabled(false);
        assert!(!server.keep_alives_enabled());
    }
}

//! Server configuration types.
//!
//! All timeout thresholds and limits applied to the serving engine live in
//! one immutable [`ServerConfig`], constructed once through the builder and
//! threaded through explicitly. Every knob is independently overridable.
//!
//! # Example
//!
//! ```rust
//! use breakwater_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .shutdown_timeout(Duration::from_secs(30))
//!     .build();
//!
//! assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
//! ```

use std::time::Duration;

use http::StatusCode;

/// Default maximum duration for reading an entire request, including the
/// body. Handlers that need per-request upload deadlines should prefer the
/// read-header timeout and enforce body deadlines themselves.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default amount of time allowed to read request headers. The connection's
/// read deadline is reset after the headers, so slow bodies are governed by
/// [`DEFAULT_READ_TIMEOUT`] instead.
pub const DEFAULT_READ_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum duration before timing out production of a response.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum amount of time to wait for the next request on a
/// keep-alive connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default TCP keep-alive probe period applied to accepted connections.
///
/// On Linux this sets both socket options that govern probing:
/// `TCP_KEEPIDLE`, the idle span before probing starts, and
/// `TCP_KEEPINTVL`, the interval between individual probes.
pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Keep-alive probe period for servers behind the Google Cloud Load
/// Balancer, whose TCP session timeout is 600 seconds. The probe period
/// must be wider so the server's own socket option loses the race against
/// the intermediary's expiry.
pub const GOOGLE_CLOUD_LB_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(620);

/// Default cap on the bytes read while parsing request headers, including
/// the request line. Does not limit the body.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1 << 20;

/// Default maximum time to wait for in-flight connections to drain during
/// graceful shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default route answering liveness probes.
pub const DEFAULT_HEALTH_ROUTE: &str = "/health";

/// Default route answering readiness probes.
pub const DEFAULT_READY_ROUTE: &str = "/ready";

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances; the defaults
/// match a server talking to well-behaved same-region clients. Deployments
/// behind a cloud load balancer should start from
/// [`ServerConfigBuilder::behind_google_cloud_load_balancer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    read_timeout: Duration,
    read_header_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    keep_alive_period: Duration,
    max_header_bytes: usize,
    shutdown_timeout: Duration,
    health_route: String,
    ready_route: String,
    status_ok_code: StatusCode,
    status_not_ok_code: StatusCode,
}

impl ServerConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the maximum duration for reading an entire request.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the time allowed to read request headers.
    #[must_use]
    pub fn read_header_timeout(&self) -> Duration {
        self.read_header_timeout
    }

    /// Returns the maximum duration for producing a response.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns the keep-alive connection idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Returns the TCP keep-alive probe period for accepted connections.
    #[must_use]
    pub fn keep_alive_period(&self) -> Duration {
        self.keep_alive_period
    }

    /// Returns the request-header byte cap.
    #[must_use]
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    /// Returns the graceful-shutdown drain deadline.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the liveness probe route.
    #[must_use]
    pub fn health_route(&self) -> &str {
        &self.health_route
    }

    /// Returns the readiness probe route.
    #[must_use]
    pub fn ready_route(&self) -> &str {
        &self.ready_route
    }

    /// Returns the status code reported by a gate in the "ok" state.
    #[must_use]
    pub fn status_ok_code(&self) -> StatusCode {
        self.status_ok_code
    }

    /// Returns the status code reported by a gate in the "not ok" state.
    #[must_use]
    pub fn status_not_ok_code(&self) -> StatusCode {
        self.status_not_ok_code
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    read_timeout: Duration,
    read_header_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    keep_alive_period: Duration,
    max_header_bytes: usize,
    shutdown_timeout: Duration,
    health_route: String,
    ready_route: String,
    status_ok_code: StatusCode,
    status_not_ok_code: StatusCode,
}

impl ServerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_header_timeout: DEFAULT_READ_HEADER_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            keep_alive_period: DEFAULT_KEEP_ALIVE_PERIOD,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            health_route: DEFAULT_HEALTH_ROUTE.to_string(),
            ready_route: DEFAULT_READY_ROUTE.to_string(),
            status_ok_code: StatusCode::OK,
            status_not_ok_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Sets the maximum duration for reading an entire request.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the time allowed to read request headers.
    #[must_use]
    pub fn read_header_timeout(mut self, timeout: Duration) -> Self {
        self.read_header_timeout = timeout;
        self
    }

    /// Sets the maximum duration for producing a response.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the keep-alive connection idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the TCP keep-alive probe period for accepted connections.
    #[must_use]
    pub fn keep_alive_period(mut self, period: Duration) -> Self {
        self.keep_alive_period = period;
        self
    }

    /// Sets the request-header byte cap.
    ///
    /// Values below the engine's internal minimum read buffer (8 KiB) are
    /// not meaningful and will be rejected by the engine at serve time.
    #[must_use]
    pub fn max_header_bytes(mut self, bytes: usize) -> Self {
        self.max_header_bytes = bytes;
        self
    }

    /// Sets the graceful-shutdown drain deadline.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the liveness probe route.
    #[must_use]
    pub fn health_route(mut self, route: impl Into<String>) -> Self {
        self.health_route = route.into();
        self
    }

    /// Sets the readiness probe route.
    #[must_use]
    pub fn ready_route(mut self, route: impl Into<String>) -> Self {
        self.ready_route = route.into();
        self
    }

    /// Sets the status code gates report in the "ok" state.
    #[must_use]
    pub fn status_ok_code(mut self, code: StatusCode) -> Self {
        self.status_ok_code = code;
        self
    }

    /// Sets the status code gates report in the "not ok" state.
    #[must_use]
    pub fn status_not_ok_code(mut self, code: StatusCode) -> Self {
        self.status_not_ok_code = code;
        self
    }

    /// Preset for deployments behind the Google Cloud Load Balancer.
    ///
    /// Widens the TCP keep-alive probe period past the load balancer's
    /// 600-second TCP session timeout, so the intermediary retires an idle
    /// upstream connection before the server abandons it. Without this,
    /// the balancer may reuse a connection the server already dropped and
    /// log `backend_connection_closed_before_data_sent_to_client`.
    #[must_use]
    pub fn behind_google_cloud_load_balancer(mut self) -> Self {
        self.keep_alive_period = GOOGLE_CLOUD_LB_KEEP_ALIVE_PERIOD;
        self
    }

    /// Builds the [`ServerConfig`].
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            read_timeout: self.read_timeout,
            read_header_timeout: self.read_header_timeout,
            write_timeout: self.write_timeout,
            idle_timeout: self.idle_timeout,
            keep_alive_period: self.keep_alive_period,
            max_header_bytes: self.max_header_bytes,
            shutdown_timeout: self.shutdown_timeout,
            health_route: self.health_route,
            ready_route: self.ready_route,
            status_ok_code: self.status_ok_code,
            status_not_ok_code: self.status_not_ok_code,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

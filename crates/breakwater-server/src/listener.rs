//! TCP listener decorator that applies keep-alive probing to accepted
//! connections.
//!
//! Stock server listeners either leave TCP keep-alive off or hardcode a
//! probe period tuned for same-host or LAN peers. Behind an intermediary
//! that holds upstream TCP sessions open for minutes (a cloud load
//! balancer, for example), a shorter probe period makes the server abandon
//! idle connections the intermediary still considers live, and the next
//! reuse fails with an upstream-closed error. The fix is a listener-level
//! socket option and needs no protocol awareness, so it lives in this thin
//! decorator rather than in the serving engine.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};

/// A listener that enables TCP keep-alive on every accepted connection.
///
/// Wraps a bound [`TcpListener`] and a probe period. The decorator holds no
/// other state and lives exactly as long as the socket it wraps.
///
/// # Example
///
/// ```rust,ignore
/// use breakwater_server::KeepAliveListener;
/// use std::time::Duration;
/// use tokio::net::TcpListener;
///
/// let inner = TcpListener::bind("127.0.0.1:0").await?;
/// let listener = KeepAliveListener::new(inner, Duration::from_secs(120));
/// let (stream, peer) = listener.accept().await?;
/// ```
#[derive(Debug)]
pub struct KeepAliveListener {
    inner: TcpListener,
    period: Duration,
}

impl KeepAliveListener {
    /// Wraps a bound listener with the given keep-alive probe period.
    #[must_use]
    pub fn new(inner: TcpListener, period: Duration) -> Self {
        Self { inner, period }
    }

    /// Accepts the next connection and enables keep-alive probing on it.
    ///
    /// The probe period is applied to both the idle threshold before
    /// probing starts and the interval between probes, mirroring what
    /// `TCP_KEEPIDLE` and `TCP_KEEPINTVL` govern on Linux. Accept errors
    /// propagate unchanged; in particular, the error produced when the
    /// socket is closed by another task is the expected signal that
    /// serving has ended, not a fault. Retry policy belongs to the accept
    /// loop, not here.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;

        let keepalive = TcpKeepalive::new()
            .with_time(self.period)
            .with_interval(self.period);
        SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

        Ok((stream, peer))
    }

    /// Returns the local address the wrapped listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Returns the configured keep-alive probe period.
    #[must_use]
    pub fn keep_alive_period(&self) -> Duration {
        self.period
    }
}

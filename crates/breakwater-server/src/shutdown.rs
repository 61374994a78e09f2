//! Graceful-shutdown coordination.
//!
//! Serving and shutting down are decoupled through three single-slot
//! channels: the serve loop deposits its terminal result on one, the
//! outside world (usually the OS-signal wiring) deposits at most one
//! shutdown request on another, and the drain reports its outcome on a
//! third. The [`ShutdownCoordinator`] multiplexes them and reduces
//! everything to the single result the caller sees:
//!
//! - A serve result that arrives before any shutdown request is reported
//!   verbatim; an unsolicited termination is never dressed up.
//! - Once a shutdown request is observed, the drain starts on its own task
//!   and the serve loop's `Closed` sentinel is discarded when it arrives,
//!   since it is the expected consequence of the shutdown itself.
//! - A non-sentinel fault from the serve loop supersedes the drain: it is
//!   returned immediately, without waiting for the drain to finish.
//! - A drain that outlives its deadline is reported as the distinguished
//!   [`ServerError::UncleanShutdown`], never as a raw timeout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::server::{Server, ServerError};

/// Receiving half of the serve-result channel.
///
/// Carries the exactly-once terminal outcome of a serve loop. The slot is
/// buffered so the serve task can deposit its result and exit without
/// waiting for the coordinator to reach its select point.
pub type ServeResults = mpsc::Receiver<Result<(), ServerError>>;

/// Sending half of the serve-result channel.
pub type ServeResultSender = mpsc::Sender<Result<(), ServerError>>;

/// Receiving half of the shutdown-request channel.
pub type ShutdownRequests = mpsc::Receiver<()>;

/// Creates the serve-result channel pair.
#[must_use]
pub fn result_channel() -> (ServeResultSender, ServeResults) {
    mpsc::channel(1)
}

/// Creates the shutdown-request channel pair.
///
/// The channel has a single buffered slot and is read at most once, so the
/// first request is always deliverable without blocking the sender.
#[must_use]
pub fn channel() -> (ShutdownTrigger, ShutdownRequests) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownTrigger { tx }, rx)
}

/// Sending half of the shutdown-request channel.
///
/// Only the first request is meaningful. [`trigger`](Self::trigger) uses a
/// non-blocking send and silently discards a request when the slot is
/// already full or the receiver is gone, so callers may trigger from signal
/// handlers, duplicate wiring, or retries without risk of blocking or of
/// perturbing a shutdown already in flight.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<()>,
}

impl ShutdownTrigger {
    /// Requests a graceful shutdown. Never blocks; duplicates are no-ops.
    pub fn trigger(&self) {
        if self.tx.try_send(()).is_err() {
            tracing::debug!("shutdown already requested, discarding duplicate request");
        }
    }
}

/// Runs the two-phase shutdown protocol for one serve loop.
///
/// Constructed with a running [`Server`], the serve-result channel, and the
/// shutdown-request channel; [`run`](Self::run) consumes the coordinator
/// and resolves to the one caller-visible outcome.
///
/// # Example
///
/// ```rust,ignore
/// let (result_tx, results) = shutdown::result_channel();
/// let (trigger, requests) = shutdown::channel();
///
/// tokio::spawn({
///     let server = server.clone();
///     async move {
///         let _ = result_tx.send(server.serve(listener).await).await;
///     }
/// });
///
/// // Elsewhere: trigger.trigger() on SIGTERM.
/// let outcome = ShutdownCoordinator::new(server, results, requests, drain_timeout)
///     .run()
///     .await;
/// ```
pub struct ShutdownCoordinator {
    server: Server,
    serve_results: ServeResults,
    requests: ShutdownRequests,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Creates a coordinator for the given server and channels.
    #[must_use]
    pub fn new(
        server: Server,
        serve_results: ServeResults,
        requests: ShutdownRequests,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            server,
            serve_results,
            requests,
            drain_timeout,
        }
    }

    /// Runs the protocol to completion and returns the final outcome.
    ///
    /// `Ok(())` means a shutdown was requested and every in-flight
    /// connection drained inside the deadline. Any other outcome is the
    /// fault or sentinel documented on [`ServerError`].
    pub async fn run(mut self) -> Result<(), ServerError> {
        // Phase one: serving. The first serve result wins outright; the
        // first shutdown request moves the protocol into draining.
        let mut requests_open = true;
        loop {
            tokio::select! {
                result = self.serve_results.recv() => {
                    return match result {
                        Some(result) => result,
                        None => {
                            tracing::warn!("serve task ended without reporting a result");
                            Err(ServerError::Closed)
                        }
                    };
                }
                request = self.requests.recv(), if requests_open => match request {
                    Some(()) => break,
                    // Every trigger was dropped unused; keep waiting on
                    // the serve result alone.
                    None => requests_open = false,
                },
            }
        }

        tracing::info!(
            timeout_secs = self.drain_timeout.as_secs(),
            "shutdown requested, draining in-flight connections"
        );

        // Phase two: draining. The drain runs on its own task so a fault
        // on the serve channel can still be observed and reported while
        // connections wind down.
        let (drain_tx, mut drain_results) = mpsc::channel(1);
        let drain_server = self.server.clone();
        let drain_timeout = self.drain_timeout;
        tokio::spawn(async move {
            let _ = drain_tx
                .send(drain_server.shutdown_with_deadline(drain_timeout).await)
                .await;
        });

        let mut serve_done = false;
        loop {
            tokio::select! {
                result = self.serve_results.recv(), if !serve_done => match result {
                    Some(Err(err)) if !err.is_closed() => {
                        // A genuine fault outranks whatever the drain
                        // would have reported.
                        return Err(err);
                    }
                    // The sentinel (or a post-shutdown clean result) is
                    // the expected consequence of the drain in progress.
                    Some(_) | None => serve_done = true,
                },
                result = drain_results.recv() => {
                    return match result {
                        Some(Ok(())) => Ok(()),
                        Some(Err(ServerError::DeadlineExceeded)) => {
                            Err(ServerError::UncleanShutdown)
                        }
                        Some(Err(err)) => Err(err),
                        None => Ok(()),
                    };
                }
            }
        }
    }
}

/// An at-most-once trigger shared between tasks.
///
/// Internal building block for the serve loop: one side trips the signal,
/// every holder can await it, and late waiters observe it immediately.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Trips the signal, waking every waiter.
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// one-shot side effects can be attached to it. Later calls are no-ops.
    pub fn trigger(&self) -> bool {
        let first = self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Returns whether the signal has been tripped.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once the signal trips; immediately if it already has.
    pub async fn recv(&self) {
        // Register interest before the final flag check, so a trigger
        // landing between the check and the await cannot be missed.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts in-flight connections and lets the drain await zero.
///
/// Every accepted connection holds a [`ConnectionToken`]; dropping the
/// token (however the connection ends) decrements the count and wakes the
/// drain when the last one goes.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Registers one connection; hold the token for its lifetime.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of connections currently in flight.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolves once every token has been dropped.
    ///
    /// Resolves immediately when nothing is in flight.
    pub async fn drained(&self) {
        loop {
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            // Register before re-checking so the last drop cannot slip
            // between the check and the wait.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Token held for the lifetime of one tracked connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        let prev = self.active.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;

    use bytes::Bytes;
    use http::{Request, Response};
    use http_body_util::Full;
    use tokio::time::{sleep, timeout, Instant};

    use crate::config::ServerConfig;

    fn hello(_req: Request<Bytes>) -> impl Future<Output = Response<Full<Bytes>>> + Send {
        async { Response::new(Full::new(Bytes::from_static(b"hello"))) }
    }

    fn test_server(drain_timeout: Duration) -> Server {
        let config = ServerConfig::builder()
            .shutdown_timeout(drain_timeout)
            .build();
        Server::new(config, hello)
    }

    #[tokio::test]
    async fn test_serve_fault_before_request_is_reported_verbatim() {
        let server = test_server(Duration::from_secs(5));
        let (result_tx, results) = result_channel();
        let (_trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let run = tokio::spawn(coordinator.run());

        result_tx
            .send(Err(ServerError::Io(io::Error::other("socket failure"))))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::Io(_))));
    }

    #[tokio::test]
    async fn test_sentinel_before_request_is_reported_verbatim() {
        let server = test_server(Duration::from_secs(5));
        let (result_tx, results) = result_channel();
        let (_trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let run = tokio::spawn(coordinator.run());

        result_tx.send(Err(ServerError::Closed)).await.unwrap();

        let result = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::Closed)));
    }

    #[tokio::test]
    async fn test_request_with_nothing_in_flight_drains_clean() {
        let server = test_server(Duration::from_secs(5));
        let (_result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let run = tokio::spawn(coordinator.run());

        trigger.trigger();

        let result = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sentinel_during_drain_is_discarded() {
        let server = test_server(Duration::from_secs(5));
        let token = server.connection_tracker().acquire();
        let (result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let mut run = tokio::spawn(coordinator.run());

        trigger.trigger();
        result_tx.send(Err(ServerError::Closed)).await.unwrap();

        // The sentinel must not conclude the protocol while a connection
        // is still draining.
        assert!(timeout(Duration::from_millis(300), &mut run).await.is_err());

        drop(token);
        let result = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fault_during_drain_supersedes_drain() {
        let server = test_server(Duration::from_secs(10));
        let token = server.connection_tracker().acquire();
        let (result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(10));
        let run = tokio::spawn(coordinator.run());

        trigger.trigger();
        sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        result_tx
            .send(Err(ServerError::Io(io::Error::other("socket failure"))))
            .await
            .unwrap();

        let result = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::Io(_))));
        // The fault must win immediately, not after the 10s drain window.
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(token);
    }

    #[tokio::test]
    async fn test_expired_drain_reports_unclean_shutdown() {
        let server = test_server(Duration::from_millis(200));
        let token = server.connection_tracker().acquire();
        let (_result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_millis(200));
        let run = tokio::spawn(coordinator.run());

        let started = Instant::now();
        trigger.trigger();

        let result = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::UncleanShutdown)));
        assert!(started.elapsed() >= Duration::from_millis(200));

        drop(token);
    }

    #[tokio::test]
    async fn test_duplicate_triggers_do_not_block_or_change_outcome() {
        let server = test_server(Duration::from_secs(5));
        let (_result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let run = tokio::spawn(coordinator.run());

        trigger.trigger();
        trigger.trigger();
        trigger.trigger();

        let result = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_trigger_keeps_waiting_for_serve_result() {
        let server = test_server(Duration::from_secs(5));
        let (result_tx, results) = result_channel();
        let (trigger, requests) = channel();

        let coordinator =
            ShutdownCoordinator::new(server, results, requests, Duration::from_secs(5));
        let mut run = tokio::spawn(coordinator.run());

        // Dropping every trigger must not read as a shutdown request.
        drop(trigger);
        assert!(timeout(Duration::from_millis(300), &mut run).await.is_err());

        result_tx.send(Err(ServerError::Closed)).await.unwrap();
        let result = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServerError::Closed)));
    }

    #[test]
    fn test_signal_trigger_reports_first_transition_only() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_signal_wakes_waiters_and_late_subscribers() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let waiting = tokio::spawn(async move { waiter.recv().await });
        sleep(Duration::from_millis(10)).await;
        signal.trigger();

        timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();

        // A subscriber arriving after the trigger resolves immediately.
        timeout(Duration::from_millis(50), signal.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tracker_counts_and_drains() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_connections(), 0);

        let first = tracker.acquire();
        let second = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        let waiter = tracker.clone();
        let drained = tokio::spawn(async move { waiter.drained().await });

        drop(first);
        assert_eq!(tracker.active_connections(), 1);
        drop(second);

        timeout(Duration::from_secs(1), drained)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_tracker_drained_is_immediate_when_empty() {
        let tracker = ConnectionTracker::new();
        timeout(Duration::from_millis(50), tracker.drained())
            .await
            .unwrap();
    }
}

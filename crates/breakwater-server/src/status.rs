//! Liveness and readiness status gates.
//!
//! A [`StatusGate`] is a lock-guarded boolean rendered as an HTTP status
//! code. An external supervisor or load balancer polls the gate's route to
//! learn whether the process is alive or ready for traffic. Gates are
//! orthogonal to the shutdown protocol but are typically flipped in
//! lock-step with it: readiness goes "not ok" the instant a shutdown
//! request is observed, before the drain begins, so the balancer stops
//! routing new traffic while in-flight requests finish.

use std::sync::Arc;

use http::{Response, StatusCode};
use parking_lot::RwLock;

use crate::handler::{status_response, ResponseBody};

/// Default status code reported while a gate is "ok".
pub const DEFAULT_STATUS_OK_CODE: StatusCode = StatusCode::OK;

/// Default status code reported while a gate is "not ok".
pub const DEFAULT_STATUS_NOT_OK_CODE: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

/// An atomically toggled ok/not-ok flag with an HTTP rendering.
///
/// The flag starts "not ok" and is flipped with [`set_ok`](Self::set_ok)
/// and [`set_not_ok`](Self::set_not_ok). Every read and write takes the
/// guarding lock, so no reader ever observes a half-written value. Clones
/// share the flag, letting the process wiring hold one end while the HTTP
/// surface answers probes from the other.
///
/// # Example
///
/// ```rust
/// use breakwater_server::StatusGate;
/// use http::StatusCode;
///
/// let gate = StatusGate::new();
/// assert_eq!(gate.status_code(), StatusCode::SERVICE_UNAVAILABLE);
///
/// gate.set_ok();
/// assert_eq!(gate.status_code(), StatusCode::OK);
/// ```
#[derive(Debug, Clone)]
pub struct StatusGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    ok: RwLock<bool>,
    ok_code: StatusCode,
    not_ok_code: StatusCode,
}

impl StatusGate {
    /// Creates a gate with the default 200 / 503 status codes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codes(DEFAULT_STATUS_OK_CODE, DEFAULT_STATUS_NOT_OK_CODE)
    }

    /// Creates a gate with custom ok / not-ok status codes.
    #[must_use]
    pub fn with_codes(ok_code: StatusCode, not_ok_code: StatusCode) -> Self {
        Self {
            inner: Arc::new(GateInner {
                ok: RwLock::new(false),
                ok_code,
                not_ok_code,
            }),
        }
    }

    /// Marks the gate "ok".
    pub fn set_ok(&self) {
        *self.inner.ok.write() = true;
    }

    /// Marks the gate "not ok".
    pub fn set_not_ok(&self) {
        *self.inner.ok.write() = false;
    }

    /// Returns whether the gate is currently "ok".
    #[must_use]
    pub fn is_ok(&self) -> bool {
        *self.inner.ok.read()
    }

    /// Returns the status code matching the current state.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_ok() {
            self.inner.ok_code
        } else {
            self.inner.not_ok_code
        }
    }

    /// Renders the gate as an empty-body HTTP response.
    #[must_use]
    pub fn response(&self) -> Response<ResponseBody> {
        status_response(self.status_code())
    }
}

impl Default for StatusGate {
    fn default() -> Self {
        Self::new()
    }
}

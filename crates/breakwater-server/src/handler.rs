//! The request-handling seam between the managed server and application
//! code.
//!
//! The server supervises a serving engine but does not route or interpret
//! requests; it hands every request to a [`Handler`] and writes back
//! whatever response comes out. Handlers receive the body already
//! collected (the server enforces the read timeout while collecting) and
//! are infallible: application errors must be rendered as HTTP responses,
//! not surfaced as handler errors.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;

/// Response body type produced by handlers.
pub type ResponseBody = Full<Bytes>;

/// Boxed future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response<ResponseBody>> + Send>>;

/// A request handler.
///
/// Implemented for any `Fn(Request<Bytes>) -> impl Future<Output =
/// Response<Full<Bytes>>>` closure, so most callers never implement this
/// trait by hand:
///
/// ```rust
/// use breakwater_server::handler::Handler;
/// use bytes::Bytes;
/// use http::{Request, Response};
/// use http_body_util::Full;
///
/// let handler = |req: Request<Bytes>| async move {
///     Response::new(Full::new(req.into_body()))
/// };
///
/// fn assert_handler(_: impl Handler) {}
/// assert_handler(handler);
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Produces the response for one request.
    fn handle(&self, req: Request<Bytes>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<ResponseBody>> + Send + 'static,
{
    fn handle(&self, req: Request<Bytes>) -> HandlerFuture {
        Box::pin(self(req))
    }
}

/// Builds an empty-body response with the given status code.
pub(crate) fn status_response(status: StatusCode) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

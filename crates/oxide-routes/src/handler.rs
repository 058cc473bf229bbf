//! Handler trait shared by policies and controller actions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::request::RouteRequest;
use crate::response::Response;

/// A boxed future for async handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler wants the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next matching handler.
    Continue,
    /// Stop dispatching this request.
    Halt,
}

/// Result returned by every handler. An `Err` aborts the remaining handlers
/// of all phases and is returned from dispatch.
pub type HandlerResult = Result<Flow, HandlerError>;

/// A request handler bound to a route.
///
/// Policies (filter routes) decide through the returned [`Flow`] whether the
/// chain continues; terminal handlers produce the response and their `Flow`
/// is ignored.
///
/// # Example
///
/// ```
/// use oxide_routes::{BoxFuture, Flow, HandlerResult, Response, RouteHandler, RouteRequest};
///
/// struct RequireJson;
///
/// impl RouteHandler for RequireJson {
///     fn call<'a>(
///         &'a self,
///         req: RouteRequest<'a>,
///         res: &'a mut Response,
///     ) -> BoxFuture<'a, HandlerResult> {
///         Box::pin(async move {
///             if req.get_header("Content-Type") == Some("application/json") {
///                 Ok(Flow::Continue)
///             } else {
///                 res.send_status(415);
///                 Ok(Flow::Halt)
///             }
///         })
///     }
/// }
/// ```
pub trait RouteHandler: Send + Sync {
    /// Handles one matched request.
    fn call<'a>(&'a self, req: RouteRequest<'a>, res: &'a mut Response)
        -> BoxFuture<'a, HandlerResult>;
}

struct FnHandler<F>(F);

impl<F> RouteHandler for FnHandler<F>
where
    F: for<'a> Fn(RouteRequest<'a>, &'a mut Response) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        req: RouteRequest<'a>,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult> {
        (self.0)(req, res)
    }
}

/// Wraps a closure as a shareable handler.
///
/// ```
/// use oxide_routes::{handler_fn, Flow};
///
/// let hello = handler_fn(|_req, res| {
///     Box::pin(async move {
///         res.send("Hello, World!");
///         Ok(Flow::Continue)
///     })
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn RouteHandler>
where
    F: for<'a> Fn(RouteRequest<'a>, &'a mut Response) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

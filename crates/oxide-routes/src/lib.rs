//! # oxide-routes
//!
//! Routing engine for pluggable web applications.
//!
//! Plugins and the host application each contribute route declarations.
//! This crate merges them into frozen dispatch tables and runs every request
//! through three phases:
//!
//! 1. **early filters**: policy routes declared `before` the terminal phase;
//! 2. **terminal**: the first matching controller route;
//! 3. **late filters**: policy routes declared `after` it.
//!
//! Filter routes match by path prefix and may be stacked; terminal routes
//! match the whole path and bind exactly one target.
//!
//! ## Quick Start
//!
//! ```
//! use oxide_routes::{
//!     handler_fn, AppRoutes, DispatchContext, Flow, PluginRoutes, Registry, Request,
//!     RouteDeclarations, Router, RouterConfig,
//! };
//!
//! # futures::executor::block_on(async {
//! let registry = Registry::new()
//!     .policy(
//!         "isadmin",
//!         handler_fn(|req, res| {
//!             Box::pin(async move {
//!                 if req.get_header("X-Role") == Some("admin") {
//!                     Ok(Flow::Continue)
//!                 } else {
//!                     res.send_status(403);
//!                     Ok(Flow::Halt)
//!                 }
//!             })
//!         }),
//!     )
//!     .action(
//!         "user",
//!         "find",
//!         handler_fn(|req, res| {
//!             Box::pin(async move {
//!                 res.send(format!("user {}", req.param("id").unwrap_or_default()));
//!                 Ok(Flow::Continue)
//!             })
//!         }),
//!     );
//!
//! let auth = PluginRoutes::new("auth")
//!     .policies(RouteDeclarations::new().route("/admin", "IsAdminPolicy"));
//! let app = AppRoutes::new().routes(
//!     RouteDeclarations::new()
//!         .route("GET /user/:id", "UserController.find")
//!         .route("GET /admin/user/:id", "UserController.find"),
//! );
//!
//! let router = Router::configure(&registry, RouterConfig::default(), &[auth], &app).unwrap();
//!
//! let ctx = router
//!     .dispatch(DispatchContext::new(Request::get("/user/42")))
//!     .await
//!     .unwrap();
//! assert_eq!(ctx.response.body_string(), Some("user 42".to_string()));
//!
//! let ctx = router
//!     .dispatch(DispatchContext::new(Request::get("/admin/user/42")))
//!     .await
//!     .unwrap();
//! assert_eq!(ctx.response.status, 403);
//! # });
//! ```
//!
//! ## Route Sources
//!
//! A source reads `[METHOD ][=|~]/path-template`. Without a method the route
//! accepts every method, including ones first seen later. `=` forces a
//! whole-path match, `~` a prefix match; otherwise filters match by prefix
//! and terminal routes exactly. See [`PathTemplate`] for the template syntax.
//!
//! ## Route Targets
//!
//! A target is a handler, a `"Name.method"` / `"Name::method"` selector, or a
//! `{name, method, args}` descriptor. Selectors are resolved against the
//! [`Registry`] with the `Controller` / `Policy` suffix stripped and the name
//! lower-cased. A target that does not resolve is logged and left out of the
//! tables; it does not abort configuration.
//!
//! ## Ordering
//!
//! Plugins are given in priority order. Their `before` routes run in that
//! order and their `after` routes in reverse, around the host application's
//! own stages:
//!
//! ```text
//! early, plugin 0 .. plugin n-1, app before, blueprints | app after, plugin n-1 .. plugin 0, late
//! ```

mod config;
mod declaration;
mod dispatch;
mod error;
mod handler;
mod index;
mod path;
mod queue;
mod registry;
mod request;
mod response;
mod route;
mod router;

pub use config::RouterConfig;
pub use declaration::{
    normalize, DeclaredValue, Profile, RouteDeclarations, RouteMap, Stage, StagedRoutes,
};
pub use dispatch::{DispatchContext, Dispatcher};
pub use error::{HandlerError, Result, RouterError};
pub use handler::{handler_fn, BoxFuture, Flow, HandlerResult, RouteHandler};
pub use index::{RoutesPerMethod, RoutesPerPrefix};
pub use path::{
    shape_reaches, MatchMode, ParamName, PathParam, PathPattern, PathTemplate, PathToken,
    RouteMethod, RouteSource, ShapePart,
};
pub use queue::{MergeQueue, Phase, Slot, SlotContent};
pub use registry::{Collection, Component, Registry};
pub use request::{Method, Params, Request, RouteRequest};
pub use response::Response;
pub use route::{compile_declarations, CompiledRoute, RouteKind, RouteTarget};
pub use router::{AppRoutes, PluginRoutes, RouteProvider, Router};

//! Route table construction and the dispatch entry point.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::declaration::{
    canonical_source, Profile, RouteDeclarations, RouteMap, Stage, StagedRoutes,
};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::{Result, RouterError};
use crate::handler::BoxFuture;
use crate::index::RoutesPerMethod;
use crate::queue::{MergeQueue, Phase, Slot};
use crate::registry::Registry;
use crate::request::Params;
use crate::route::{compile_declarations, CompiledRoute, RouteKind};

/// Route declarations contributed by one plugin.
#[derive(Debug, Clone, Default)]
pub struct PluginRoutes {
    name: String,
    policies: RouteDeclarations,
    routes: RouteDeclarations,
    blueprints: RouteDeclarations,
}

impl PluginRoutes {
    /// Creates an empty set of declarations for plugin `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reads `{"policies": .., "routes": .., "blueprints": ..}`; every key is
    /// optional.
    pub fn from_json(name: impl Into<String>, value: &Value) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            policies: declarations_field(value, "policies")?,
            routes: declarations_field(value, "routes")?,
            blueprints: declarations_field(value, "blueprints")?,
        })
    }

    /// Sets the filter route declarations (`before` / `after`).
    #[must_use]
    pub fn policies(mut self, declarations: RouteDeclarations) -> Self {
        self.policies = declarations;
        self
    }

    /// Sets the terminal route declarations (`before` / `after`).
    #[must_use]
    pub fn routes(mut self, declarations: RouteDeclarations) -> Self {
        self.routes = declarations;
        self
    }

    /// Sets the blueprint route declarations, which fill the inner action.
    #[must_use]
    pub fn blueprints(mut self, declarations: RouteDeclarations) -> Self {
        self.blueprints = declarations;
        self
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Route declarations of the host application.
#[derive(Debug, Clone, Default)]
pub struct AppRoutes {
    policies: RouteDeclarations,
    routes: RouteDeclarations,
}

impl AppRoutes {
    /// Creates empty application declarations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `{"policies": .., "routes": ..}`; both keys are optional.
    ///
    /// ```
    /// use oxide_routes::AppRoutes;
    ///
    /// let app = AppRoutes::from_json(&serde_json::json!({
    ///     "policies": {"early": {"/": "TracePolicy"}},
    ///     "routes": {"GET /": "HomeController.index"}
    /// }))
    /// .unwrap();
    /// # let _ = app;
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self {
            policies: declarations_field(value, "policies")?,
            routes: declarations_field(value, "routes")?,
        })
    }

    /// Sets the filter route declarations (`early` / `before` / `after` / `late`).
    #[must_use]
    pub fn policies(mut self, declarations: RouteDeclarations) -> Self {
        self.policies = declarations;
        self
    }

    /// Sets the terminal route declarations (`early` / `before` / `after` / `late`).
    #[must_use]
    pub fn routes(mut self, declarations: RouteDeclarations) -> Self {
        self.routes = declarations;
        self
    }
}

fn declarations_field(value: &Value, key: &str) -> Result<RouteDeclarations> {
    let Value::Object(map) = value else {
        return Err(RouterError::InvalidDeclaration(format!(
            "expected an object with `{key}`, found {value}"
        )));
    };
    map.get(key)
        .map_or(Ok(RouteDeclarations::Empty), RouteDeclarations::from_json)
}

/// A source of plugin route declarations that may need to be awaited.
pub trait RouteProvider: Send + Sync {
    /// Plugin name, for diagnostics.
    fn name(&self) -> &str;

    /// Produces the plugin's declarations.
    fn declarations(&self) -> BoxFuture<'_, Result<PluginRoutes>>;
}

impl RouteProvider for PluginRoutes {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> BoxFuture<'_, Result<PluginRoutes>> {
        Box::pin(async move { Ok(self.clone()) })
    }
}

/// Frozen route tables and the dispatch entry point.
///
/// Built once by [`Router::configure`]; afterwards it is immutable and can
/// be shared through an `Arc` by any number of concurrent dispatches.
///
/// # Example
///
/// ```
/// use oxide_routes::{
///     handler_fn, AppRoutes, DispatchContext, Flow, Registry, Request, RouteDeclarations,
///     Router, RouterConfig,
/// };
///
/// # futures::executor::block_on(async {
/// let registry = Registry::new().action(
///     "user",
///     "find",
///     handler_fn(|req, res| {
///         Box::pin(async move {
///             res.send(format!("user {}", req.param("id").unwrap_or_default()));
///             Ok(Flow::Continue)
///         })
///     }),
/// );
/// let app = AppRoutes::new()
///     .routes(RouteDeclarations::new().route("GET /user/:id", "UserController.find"));
///
/// let router = Router::configure(&registry, RouterConfig::default(), &[], &app).unwrap();
/// let ctx = router
///     .dispatch(DispatchContext::new(Request::get("/user/42")))
///     .await
///     .unwrap();
/// assert_eq!(ctx.response.body_string(), Some("user 42".to_string()));
/// # });
/// ```
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    dispatcher: Dispatcher,
    terminal: Vec<Arc<CompiledRoute>>,
    invalid: Vec<Arc<CompiledRoute>>,
}

impl Router {
    /// Merges plugin and application declarations into frozen dispatch
    /// tables.
    ///
    /// `plugins` must already be in priority order, index `0` being the most
    /// depended-upon plugin. Filter routes in `before` slots become early
    /// filters and those in `after` slots late filters; terminal routes are
    /// tried in `before` then `after` slot order.
    pub fn configure(
        registry: &Registry,
        config: RouterConfig,
        plugins: &[PluginRoutes],
        app: &AppRoutes,
    ) -> Result<Self> {
        let mut policies: MergeQueue<RouteMap> = MergeQueue::new(plugins.len());
        let mut routes: MergeQueue<RouteMap> = MergeQueue::new(plugins.len());

        for (index, plugin) in plugins.iter().enumerate() {
            fill_plugin_slots(&mut policies, index, plugin.policies.normalize(Profile::Plugin)?)?;
            fill_plugin_slots(&mut routes, index, plugin.routes.normalize(Profile::Plugin)?)?;

            let blueprints = plugin.blueprints.normalize(Profile::Blueprint)?;
            routes.inner_action_slot()?.extend(blueprints.before);
        }

        let mut app_policies = app.policies.normalize(Profile::Application)?;
        let mut app_routes = app.routes.normalize(Profile::Application)?;
        for stage in Stage::ALL {
            *policies.slot_for_host(stage)? = app_policies.take(stage);
            *routes.slot_for_host(stage)? = app_routes.take(stage);
        }

        let plugin_count = policies.plugin_count();
        policies.compact();
        routes.compact();
        let (policies_before, policies_after) = policies.into_lists();
        let (routes_before, routes_after) = routes.into_lists();

        let mut invalid = Vec::new();
        let mut early = RoutesPerMethod::new(config.sensitive);
        let mut late = RoutesPerMethod::new(config.sensitive);
        let mut terminal_table = RoutesPerMethod::new(config.sensitive);

        let early_routes = compile_slots(RouteKind::Policy, &policies_before, registry, &config)?;
        let late_routes = compile_slots(RouteKind::Policy, &policies_after, registry, &config)?;
        let terminal_routes = compile_slots(
            RouteKind::Terminal,
            routes_before.iter().chain(&routes_after),
            registry,
            &config,
        )?;

        let early_count = admit(&mut early, early_routes, &mut invalid)?;
        let late_count = admit(&mut late, late_routes, &mut invalid)?;
        let mut terminal = Vec::new();
        for route in terminal_routes {
            if route.is_valid() {
                terminal_table.append(Arc::clone(&route))?;
                terminal.push(route);
            } else {
                invalid.push(route);
            }
        }

        debug!(
            early = early_count,
            terminal = terminal.len(),
            late = late_count,
            invalid = invalid.len(),
            "route tables built"
        );
        info!(plugins = plugin_count, routes = terminal.len(), "router configured");

        Ok(Self {
            config,
            dispatcher: Dispatcher::new(early, terminal_table, late),
            terminal,
            invalid,
        })
    }

    /// Like [`configure`](Self::configure), awaiting every provider's
    /// declarations first. Providers are given in priority order.
    pub async fn configure_from(
        registry: &Registry,
        config: RouterConfig,
        providers: &[Arc<dyn RouteProvider>],
        app: &AppRoutes,
    ) -> Result<Self> {
        debug!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "collecting plugin routes"
        );
        let plugins = try_join_all(providers.iter().map(|provider| provider.declarations())).await?;
        Self::configure(registry, config, &plugins, app)
    }

    /// Runs the request through the early, terminal and late phases.
    pub async fn dispatch(&self, ctx: DispatchContext) -> Result<DispatchContext> {
        self.dispatcher.dispatch(ctx).await
    }

    /// Builds a path for the terminal route declared under `source`.
    ///
    /// ```
    /// use oxide_routes::{
    ///     handler_fn, AppRoutes, Flow, Params, Registry, RouteDeclarations, Router, RouterConfig,
    /// };
    ///
    /// let registry = Registry::new().action(
    ///     "user",
    ///     "find",
    ///     handler_fn(|_req, _res| Box::pin(async { Ok(Flow::Continue) })),
    /// );
    /// let app = AppRoutes::new()
    ///     .routes(RouteDeclarations::new().route("GET /user/:id", "UserController.find"));
    /// let router = Router::configure(&registry, RouterConfig::default(), &[], &app).unwrap();
    ///
    /// let params: Params = [("id", "42")].into_iter().collect();
    /// assert_eq!(router.url_for("get /user/:id", &params).unwrap(), "/user/42");
    /// ```
    pub fn url_for(&self, source: &str, params: &Params) -> Result<String> {
        let source = canonical_source(source);
        self.terminal
            .iter()
            .find(|route| route.source() == source)
            .ok_or_else(|| RouterError::RouteNotFound(source.clone()))?
            .compile_path(params)
    }

    /// Methods of the terminal routes matching `path`, in dispatch order.
    /// `ALL` stands for a route accepting every method.
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = Vec::new();
        for route in &self.terminal {
            let method = route.method().as_str();
            if !methods.iter().any(|known| known == method) && route.match_path(path).is_some() {
                methods.push(method.to_string());
            }
        }
        methods
    }

    /// Valid terminal routes, in dispatch order.
    pub fn routes(&self) -> impl Iterator<Item = &CompiledRoute> {
        self.terminal.iter().map(|route| &**route)
    }

    /// Routes left out because their target could not be resolved.
    pub fn invalid_routes(&self) -> impl Iterator<Item = &CompiledRoute> {
        self.invalid.iter().map(|route| &**route)
    }

    /// The dispatcher and its tables.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Configuration the router was built with.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

fn fill_plugin_slots(
    queue: &mut MergeQueue<RouteMap>,
    index: usize,
    mut staged: StagedRoutes,
) -> Result<()> {
    *queue.slot_for_plugin(index, Phase::Before)? = staged.take(Stage::Before);
    *queue.slot_for_plugin(index, Phase::After)? = staged.take(Stage::After);
    Ok(())
}

fn compile_slots<'q>(
    kind: RouteKind,
    slots: impl IntoIterator<Item = &'q (Slot, RouteMap)>,
    registry: &Registry,
    config: &RouterConfig,
) -> Result<Vec<Arc<CompiledRoute>>> {
    let mut compiled = Vec::new();
    for (slot, map) in slots {
        let routes = compile_declarations(kind, map, registry, config)?;
        debug!(?slot, kind = ?kind, routes = routes.len(), "compiled slot");
        compiled.extend(routes.into_iter().map(Arc::new));
    }
    Ok(compiled)
}

/// Appends the valid routes to `table` and the rest to `invalid`.
fn admit(
    table: &mut RoutesPerMethod,
    routes: Vec<Arc<CompiledRoute>>,
    invalid: &mut Vec<Arc<CompiledRoute>>,
) -> Result<usize> {
    let mut admitted = 0;
    for route in routes {
        if route.is_valid() {
            table.append(route)?;
            admitted += 1;
        } else {
            invalid.push(route);
        }
    }
    Ok(admitted)
}

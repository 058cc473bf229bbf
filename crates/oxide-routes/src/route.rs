//! Route targets and compiled routes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::declaration::RouteMap;
use crate::error::{Result, RouterError};
use crate::handler::RouteHandler;
use crate::path::{
    shape_reaches, MatchMode, PathParam, PathPattern, RouteMethod, RouteSource, ShapePart,
};
use crate::registry::{Collection, Registry};
use crate::request::Params;

/// The two kinds of routes. They differ only in target suffix, registry
/// collection, default match mode and how many targets a source may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Filter route: prefix match by default, any number of targets.
    Policy,
    /// Terminal route: exact match by default, exactly one target.
    Terminal,
}

impl RouteKind {
    /// Suffix stripped from target names, e.g. `Controller`.
    pub fn suffix(self, config: &RouterConfig) -> &str {
        match self {
            Self::Policy => &config.policy_suffix,
            Self::Terminal => &config.controller_suffix,
        }
    }

    /// Registry collection the targets resolve against.
    pub fn collection(self) -> Collection {
        match self {
            Self::Policy => Collection::Policies,
            Self::Terminal => Collection::Controllers,
        }
    }

    /// Match mode used when the source carries no `=` / `~` modifier.
    pub fn default_mode(self) -> MatchMode {
        match self {
            Self::Policy => MatchMode::Prefix,
            Self::Terminal => MatchMode::Exact,
        }
    }

    /// Whether one source may bind several targets.
    pub fn allows_multiple_targets(self) -> bool {
        matches!(self, Self::Policy)
    }
}

/// What a route source is bound to.
#[derive(Clone)]
pub enum RouteTarget {
    /// A handler used verbatim.
    Handler(Arc<dyn RouteHandler>),
    /// A named component and optional method, resolved against the registry.
    Action {
        /// Component name, e.g. `UserController` or `user`.
        name: String,
        /// Method (action) name.
        method: Option<String>,
        /// Static arguments forwarded on every invocation.
        args: Vec<Value>,
    },
}

#[derive(Deserialize)]
struct TargetDescriptor {
    #[serde(alias = "controller", alias = "policy")]
    name: String,
    #[serde(default, alias = "action")]
    method: Option<String>,
    #[serde(default)]
    args: Vec<Value>,
}

impl RouteTarget {
    /// Parses a `"Name.method"`, `"Name::method"` or `"Name"` selector.
    pub fn action(selector: &str) -> Self {
        let selector = selector.trim();
        let (name, method) = match selector.split_once("::") {
            Some((name, method)) => (name, Some(method)),
            None => match selector.split_once('.') {
                Some((name, method)) => (name, Some(method)),
                None => (selector, None),
            },
        };
        Self::Action {
            name: name.to_string(),
            method: method.map(str::to_string),
            args: Vec::new(),
        }
    }

    /// Builds a `{name, method, args}` descriptor target.
    pub fn descriptor(
        name: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self::Action {
            name: name.into(),
            method: Some(method.into()),
            args,
        }
    }

    /// Reads targets from JSON: a selector string, a descriptor object, or
    /// an array of either.
    pub fn from_json(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::String(selector) => Ok(vec![Self::action(selector)]),
            Value::Object(_) => {
                let descriptor: TargetDescriptor = serde_json::from_value(value.clone())?;
                Ok(vec![Self::Action {
                    name: descriptor.name,
                    method: descriptor.method,
                    args: descriptor.args,
                }])
            }
            Value::Array(items) => {
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_array() {
                        return Err(RouterError::InvalidDeclaration(
                            "target lists cannot be nested".to_string(),
                        ));
                    }
                    targets.extend(Self::from_json(item)?);
                }
                Ok(targets)
            }
            other => Err(RouterError::InvalidDeclaration(format!(
                "unsupported route target: {other}"
            ))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Handler(_) => "<handler>".to_string(),
            Self::Action {
                name,
                method: Some(method),
                ..
            } => format!("{name}.{method}"),
            Self::Action { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Action { name, method, args } => f
                .debug_struct("Action")
                .field("name", name)
                .field("method", method)
                .field("args", args)
                .finish(),
        }
    }
}

impl From<&str> for RouteTarget {
    fn from(selector: &str) -> Self {
        Self::action(selector)
    }
}

impl From<Arc<dyn RouteHandler>> for RouteTarget {
    fn from(handler: Arc<dyn RouteHandler>) -> Self {
        Self::Handler(handler)
    }
}

/// A route source bound to a resolved target.
#[derive(Clone)]
pub struct CompiledRoute {
    kind: RouteKind,
    source: String,
    method: RouteMethod,
    mode: MatchMode,
    prefix: String,
    pattern: PathPattern,
    shapes: Vec<Vec<ShapePart>>,
    target: String,
    handler: Option<Arc<dyn RouteHandler>>,
    args: Vec<Value>,
    warning: Option<String>,
}

impl CompiledRoute {
    /// Compiles one source/target pair.
    ///
    /// A structurally invalid source is an error. An unresolvable target is
    /// not: the route comes back with [`is_valid`](Self::is_valid) `false`
    /// and a [`warning`](Self::warning).
    pub fn compile(
        kind: RouteKind,
        source: &str,
        target: &RouteTarget,
        registry: &Registry,
        config: &RouterConfig,
    ) -> Result<Self> {
        let parsed = RouteSource::parse(source)?;
        let mode = parsed.mode.unwrap_or_else(|| kind.default_mode());
        let pattern = parsed
            .template
            .to_pattern(mode, config.sensitive, config.strict)?;
        let shapes = parsed
            .template
            .examples()
            .into_iter()
            .map(|shape| fold_shape(shape, config.sensitive))
            .collect();

        let (handler, args, warning) = match target {
            RouteTarget::Handler(handler) => (Some(Arc::clone(handler)), Vec::new(), None),
            RouteTarget::Action { name, method, args } => {
                let identity = identity(name, kind.suffix(config));
                match registry.resolve(kind.collection(), &identity, method.as_deref()) {
                    Ok(handler) => (Some(handler), args.clone(), None),
                    Err(reason) => (None, args.clone(), Some(reason)),
                }
            }
        };

        Ok(Self {
            kind,
            source: source.trim().to_string(),
            method: parsed.method,
            mode,
            prefix: parsed.template.literal_prefix(),
            pattern,
            shapes,
            target: target.describe(),
            handler,
            args,
            warning,
        })
    }

    /// Route kind.
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// The source string as declared.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Method selector.
    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    /// Effective match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Literal path prefix used for indexing.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Compiled path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Parameters in template order.
    pub fn parameters(&self) -> impl Iterator<Item = &PathParam> {
        self.pattern.template().params()
    }

    /// Description of the declared target, for diagnostics.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The resolved handler, if the target could be resolved.
    pub fn handler(&self) -> Option<&Arc<dyn RouteHandler>> {
        self.handler.as_ref()
    }

    /// Static arguments forwarded to the handler.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Why the target could not be resolved.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Returns `true` if the target resolved to a handler.
    pub fn is_valid(&self) -> bool {
        self.handler.is_some()
    }

    /// Matches a request path, returning the captured parameters.
    pub fn match_path(&self, path: &str) -> Option<Params> {
        self.pattern.match_path(path)
    }

    /// Builds a path for this route from parameter values.
    pub fn compile_path(&self, params: &Params) -> Result<String> {
        self.pattern.reverse(params)
    }

    /// Returns `true` if one of the route's example shapes can produce a
    /// path starting with `prefix` (already case-folded like the route).
    ///
    /// This is a heuristic: each parameter stands for a single segment, so a
    /// custom pattern that can match `/`, such as `(.*)` or an alternation
    /// like `(a/b|c)`, is never seen to reach a deeper prefix.
    pub fn reaches_prefix(&self, prefix: &str) -> bool {
        let extensible = self.mode == MatchMode::Prefix;
        self.shapes
            .iter()
            .any(|shape| shape_reaches(shape, prefix, extensible))
    }

    /// Returns `true` if literals compare case-sensitively.
    pub fn is_sensitive(&self) -> bool {
        self.pattern.is_sensitive()
    }
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("method", &self.method)
            .field("mode", &self.mode)
            .field("prefix", &self.prefix)
            .field("target", &self.target)
            .field("valid", &self.is_valid())
            .field("warning", &self.warning)
            .finish_non_exhaustive()
    }
}

/// Folds path text for comparison under the configured case sensitivity.
pub(crate) fn fold_case(text: &str, sensitive: bool) -> Cow<'_, str> {
    if sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_lowercase())
    }
}

fn fold_shape(shape: Vec<ShapePart>, sensitive: bool) -> Vec<ShapePart> {
    if sensitive {
        return shape;
    }
    shape
        .into_iter()
        .map(|part| match part {
            ShapePart::Literal(text) => ShapePart::Literal(text.to_lowercase()),
            other => other,
        })
        .collect()
}

/// `UserController` -> `user`; the suffix comparison ignores case.
fn identity(name: &str, suffix: &str) -> String {
    let trimmed = name.trim();
    let stem = trimmed
        .len()
        .checked_sub(suffix.len())
        .filter(|&split| split > 0)
        .and_then(|split| {
            let tail = trimmed.get(split..)?;
            tail.eq_ignore_ascii_case(suffix).then(|| &trimmed[..split])
        })
        .unwrap_or(trimmed);
    stem.to_lowercase()
}

/// Compiles every source/target pair of `routes`, in declaration order.
///
/// Fails on structurally invalid sources and on terminal sources naming more
/// than one target. Unresolvable targets are logged and returned as invalid
/// routes for the caller to exclude.
pub fn compile_declarations(
    kind: RouteKind,
    routes: &RouteMap,
    registry: &Registry,
    config: &RouterConfig,
) -> Result<Vec<CompiledRoute>> {
    let mut compiled = Vec::with_capacity(routes.len());
    for (source, targets) in routes {
        if targets.len() > 1 && !kind.allows_multiple_targets() {
            return Err(RouterError::MultipleTargets {
                route: source.clone(),
            });
        }
        if targets.is_empty() {
            debug!(route = %source, "route declares no targets, skipping");
        }
        for target in targets {
            let route = CompiledRoute::compile(kind, source, target, registry, config)?;
            if let Some(warning) = route.warning() {
                warn!(
                    route = %route.source(),
                    target = %route.target(),
                    "ignoring route: {warning}"
                );
            }
            compiled.push(route);
        }
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Flow};

    fn noop() -> Arc<dyn RouteHandler> {
        handler_fn(|_req, _res| Box::pin(async { Ok(Flow::Continue) }))
    }

    fn registry() -> Registry {
        Registry::new()
            .action("user", "find", noop())
            .policy("isloggedin", noop())
    }

    #[test]
    fn test_identity() {
        assert_eq!(identity("UserController", "Controller"), "user");
        assert_eq!(identity("usercontroller", "Controller"), "user");
        assert_eq!(identity("User", "Controller"), "user");
        assert_eq!(identity("Controller", "Controller"), "controller");
        assert_eq!(identity("IsLoggedInPolicy", "Policy"), "isloggedin");
    }

    #[test]
    fn test_action_selectors() {
        for selector in ["UserController.find", "UserController::find"] {
            match RouteTarget::action(selector) {
                RouteTarget::Action { name, method, .. } => {
                    assert_eq!(name, "UserController");
                    assert_eq!(method.as_deref(), Some("find"));
                }
                RouteTarget::Handler(_) => panic!("expected action"),
            }
        }
    }

    #[test]
    fn test_targets_from_json() {
        let targets = RouteTarget::from_json(&serde_json::json!([
            "isLoggedIn",
            {"name": "Rate", "method": "strict", "args": [10]}
        ]))
        .unwrap();
        assert_eq!(targets.len(), 2);
        match &targets[1] {
            RouteTarget::Action { name, method, args } => {
                assert_eq!(name, "Rate");
                assert_eq!(method.as_deref(), Some("strict"));
                assert_eq!(args, &vec![serde_json::json!(10)]);
            }
            RouteTarget::Handler(_) => panic!("expected action"),
        }

        assert!(RouteTarget::from_json(&serde_json::json!(42)).is_err());
        assert!(RouteTarget::from_json(&serde_json::json!([["a"]])).is_err());
    }

    #[test]
    fn test_compile_terminal() {
        let route = CompiledRoute::compile(
            RouteKind::Terminal,
            "GET /user/:id",
            &RouteTarget::action("UserController.find"),
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap();

        assert!(route.is_valid());
        assert_eq!(route.method(), &RouteMethod::Named("GET".to_string()));
        assert_eq!(route.mode(), MatchMode::Exact);
        assert_eq!(route.prefix(), "/user");
        assert_eq!(route.parameters().count(), 1);
        assert_eq!(route.match_path("/user/42").unwrap().get("id"), Some("42"));
        assert!(route.match_path("/user/42/edit").is_none());
    }

    #[test]
    fn test_compile_policy_defaults_to_prefix() {
        let route = CompiledRoute::compile(
            RouteKind::Policy,
            "/admin",
            &RouteTarget::action("IsLoggedInPolicy"),
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap();

        assert!(route.is_valid());
        assert_eq!(route.mode(), MatchMode::Prefix);
        assert!(route.match_path("/admin/users").is_some());
        assert!(route.match_path("/adminx").is_none());
    }

    #[test]
    fn test_unresolved_target_is_invalid_not_fatal() {
        let route = CompiledRoute::compile(
            RouteKind::Terminal,
            "/pets",
            &RouteTarget::action("PetController.list"),
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap();

        assert!(!route.is_valid());
        assert_eq!(route.warning(), Some("controller `pet` is not registered"));
    }

    #[test]
    fn test_descriptor_args_are_kept() {
        let route = CompiledRoute::compile(
            RouteKind::Terminal,
            "/me",
            &RouteTarget::descriptor("User", "find", vec![Value::from("self")]),
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap();
        assert_eq!(route.args(), &[Value::from("self")]);
    }

    #[test]
    fn test_multiple_terminal_targets_fail() {
        let mut routes = RouteMap::new();
        routes.insert(
            "GET /user".to_string(),
            vec![RouteTarget::action("User.find"), RouteTarget::action("User.find")],
        );
        let err = compile_declarations(
            RouteKind::Terminal,
            &routes,
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RouterError::MultipleTargets { .. }));

        let policies = compile_declarations(
            RouteKind::Policy,
            &routes,
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap();
        assert_eq!(policies.len(), 2);
    }

    #[test]
    fn test_invalid_source_is_fatal() {
        let mut routes = RouteMap::new();
        routes.insert("GET user".to_string(), vec![RouteTarget::action("User.find")]);
        let err = compile_declarations(
            RouteKind::Terminal,
            &routes,
            &registry(),
            &RouterConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RouterError::InvalidSource { .. }));
    }

    #[test]
    fn test_reaches_prefix() {
        let route = CompiledRoute::compile(
            RouteKind::Terminal,
            "/User/:id",
            &RouteTarget::Handler(noop()),
            &Registry::new(),
            &RouterConfig::default(),
        )
        .unwrap();
        assert!(route.reaches_prefix("/user/admin"));
        assert!(!route.reaches_prefix("/users"));
    }
}

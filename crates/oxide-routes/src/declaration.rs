//! Raw route declarations and their normalization into per-stage maps.
//!
//! Plugins and the host application describe routes either as ordered
//! `[source, target]` pairs or as keyed structures. A keyed structure whose
//! keys are all stage names is split by stage; anything else is taken whole
//! as the `before` stage.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Result, RouterError};
use crate::route::RouteTarget;

/// Canonical mapping from route source to its targets, in declaration order.
pub type RouteMap = IndexMap<String, Vec<RouteTarget>>;

/// Position of a declaration relative to the terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Ahead of every plugin's `before` routes.
    Early,
    /// Before the terminal phase.
    Before,
    /// After the terminal phase.
    After,
    /// Behind every plugin's `after` routes.
    Late,
}

impl Stage {
    /// All stages, in dispatch order.
    pub const ALL: [Stage; 4] = [Stage::Early, Stage::Before, Stage::After, Stage::Late];

    /// Parses a stage key.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "early" => Some(Self::Early),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            "late" => Some(Self::Late),
            _ => None,
        }
    }

    /// The stage key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Before => "before",
            Self::After => "after",
            Self::Late => "late",
        }
    }
}

/// Which stage keys a declaration may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Plugin declarations: `before` and `after`.
    Plugin,
    /// Host application declarations: `early`, `before`, `after`, `late`.
    Application,
    /// Blueprint declarations: never staged.
    Blueprint,
}

impl Profile {
    /// Profile name used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Application => "application",
            Self::Blueprint => "blueprint",
        }
    }

    fn recognizes(self, stage: Stage) -> bool {
        match self {
            Self::Plugin => matches!(stage, Stage::Before | Stage::After),
            Self::Application => true,
            Self::Blueprint => false,
        }
    }
}

/// A value in a keyed declaration.
#[derive(Debug, Clone)]
pub enum DeclaredValue {
    /// Targets bound to the key's source.
    Targets(Vec<RouteTarget>),
    /// Nested declarations under a stage key.
    Group(RouteDeclarations),
}

/// Route declarations as supplied by a plugin or the host application.
///
/// ```
/// use oxide_routes::{Profile, RouteDeclarations};
///
/// let declarations = RouteDeclarations::new()
///     .stage("before", RouteDeclarations::new().route("/admin", "IsAdminPolicy"))
///     .stage("after", RouteDeclarations::new().route("/", "AuditPolicy"));
///
/// let staged = declarations.normalize(Profile::Plugin).unwrap();
/// assert!(staged.before.contains_key("/admin"));
/// assert!(staged.after.contains_key("/"));
/// ```
#[derive(Debug, Clone, Default)]
pub enum RouteDeclarations {
    /// Nothing declared.
    #[default]
    Empty,
    /// Ordered `[source, target]` pairs.
    Pairs(Vec<(String, Vec<RouteTarget>)>),
    /// Ordered keyed structure; stage keys may hold nested groups.
    Keyed(Vec<(String, DeclaredValue)>),
}

impl RouteDeclarations {
    /// Creates an empty keyed declaration.
    pub fn new() -> Self {
        Self::Keyed(Vec::new())
    }

    /// Creates an empty pair-list declaration.
    pub fn pairs() -> Self {
        Self::Pairs(Vec::new())
    }

    /// Adds a source bound to one target.
    #[must_use]
    pub fn route(self, source: impl Into<String>, target: impl Into<RouteTarget>) -> Self {
        self.routes(source, [target])
    }

    /// Adds a source bound to several targets.
    #[must_use]
    pub fn routes<T: Into<RouteTarget>>(
        self,
        source: impl Into<String>,
        targets: impl IntoIterator<Item = T>,
    ) -> Self {
        let source = source.into();
        let targets: Vec<RouteTarget> = targets.into_iter().map(Into::into).collect();
        match self {
            Self::Pairs(mut pairs) => {
                pairs.push((source, targets));
                Self::Pairs(pairs)
            }
            other => {
                let mut entries = other.into_keyed();
                entries.push((source, DeclaredValue::Targets(targets)));
                Self::Keyed(entries)
            }
        }
    }

    /// Adds a nested group under a stage key.
    #[must_use]
    pub fn stage(self, name: impl Into<String>, nested: RouteDeclarations) -> Self {
        let mut entries = self.into_keyed();
        entries.push((name.into(), DeclaredValue::Group(nested)));
        Self::Keyed(entries)
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Pairs(pairs) => pairs.is_empty(),
            Self::Keyed(entries) => entries.is_empty(),
        }
    }

    /// Reads declarations from JSON.
    ///
    /// Accepts `null`, an array of `[source, target]` pairs, or an object
    /// mapping sources to targets. Under an object, a stage key holding an
    /// object or a list of pairs becomes a nested group.
    ///
    /// ```
    /// use oxide_routes::RouteDeclarations;
    ///
    /// let declarations = RouteDeclarations::from_json(&serde_json::json!([
    ///     ["GET /user/:id", "UserController.find"],
    ///     ["POST /user", {"name": "User", "method": "create"}]
    /// ]))
    /// .unwrap();
    /// assert!(!declarations.is_empty());
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Array(items) => {
                let mut pairs = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_array().map(Vec::as_slice) {
                        Some([Value::String(source), target]) => {
                            pairs.push((source.clone(), RouteTarget::from_json(target)?));
                        }
                        _ => {
                            return Err(RouterError::InvalidDeclaration(format!(
                                "expected a [source, target] pair, found {item}"
                            )))
                        }
                    }
                }
                Ok(Self::Pairs(pairs))
            }
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let declared = if Stage::parse(key).is_some() && is_group(value) {
                        DeclaredValue::Group(Self::from_json(value)?)
                    } else {
                        DeclaredValue::Targets(RouteTarget::from_json(value)?)
                    };
                    entries.push((key.clone(), declared));
                }
                Ok(Self::Keyed(entries))
            }
            other => Err(RouterError::InvalidDeclaration(format!(
                "expected an array or object of routes, found {other}"
            ))),
        }
    }

    /// Normalizes into per-stage route maps under `profile`.
    pub fn normalize(&self, profile: Profile) -> Result<StagedRoutes> {
        normalize(self, profile)
    }

    fn into_keyed(self) -> Vec<(String, DeclaredValue)> {
        match self {
            Self::Empty => Vec::new(),
            Self::Keyed(entries) => entries,
            Self::Pairs(pairs) => pairs
                .into_iter()
                .map(|(source, targets)| (source, DeclaredValue::Targets(targets)))
                .collect(),
        }
    }
}

fn is_group(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_array),
        _ => false,
    }
}

/// Normalized declarations, one route map per stage.
#[derive(Debug, Clone, Default)]
pub struct StagedRoutes {
    /// `early` stage; application profile only.
    pub early: RouteMap,
    /// `before` stage, and every unstaged declaration.
    pub before: RouteMap,
    /// `after` stage.
    pub after: RouteMap,
    /// `late` stage; application profile only.
    pub late: RouteMap,
}

impl StagedRoutes {
    /// The map for one stage.
    pub fn get(&self, stage: Stage) -> &RouteMap {
        match stage {
            Stage::Early => &self.early,
            Stage::Before => &self.before,
            Stage::After => &self.after,
            Stage::Late => &self.late,
        }
    }

    /// Mutable access to the map for one stage.
    pub fn get_mut(&mut self, stage: Stage) -> &mut RouteMap {
        match stage {
            Stage::Early => &mut self.early,
            Stage::Before => &mut self.before,
            Stage::After => &mut self.after,
            Stage::Late => &mut self.late,
        }
    }

    /// Takes the map for one stage, leaving it empty.
    pub fn take(&mut self, stage: Stage) -> RouteMap {
        std::mem::take(self.get_mut(stage))
    }

    /// Returns `true` if no stage holds a route.
    pub fn is_empty(&self) -> bool {
        Stage::ALL.iter().all(|stage| self.get(*stage).is_empty())
    }
}

/// Normalizes raw declarations into per-stage route maps.
///
/// Fails with [`RouterError::ReservedStage`] when a keyed declaration uses a
/// stage key the profile does not support.
pub fn normalize(declarations: &RouteDeclarations, profile: Profile) -> Result<StagedRoutes> {
    let mut staged = StagedRoutes::default();

    let entries = match declarations {
        RouteDeclarations::Empty => return Ok(staged),
        RouteDeclarations::Pairs(pairs) => {
            for (source, targets) in pairs {
                insert(&mut staged.before, source, targets);
            }
            return Ok(staged);
        }
        RouteDeclarations::Keyed(entries) => entries,
    };

    if profile != Profile::Blueprint {
        if let Some(stage) = entries
            .iter()
            .filter_map(|(key, _)| Stage::parse(key))
            .find(|stage| !profile.recognizes(*stage))
        {
            return Err(RouterError::ReservedStage {
                stage: stage.as_str().to_string(),
                profile: profile.as_str(),
            });
        }
    }

    let split = profile != Profile::Blueprint
        && !entries.is_empty()
        && entries.iter().all(|(key, _)| Stage::parse(key).is_some());

    if split {
        for (key, value) in entries {
            let Some(stage) = Stage::parse(key) else {
                continue;
            };
            match value {
                DeclaredValue::Group(nested) => {
                    flatten_into(staged.get_mut(stage), nested, profile)?
                }
                DeclaredValue::Targets(_) => {
                    return Err(RouterError::InvalidDeclaration(format!(
                        "stage `{key}` must hold route declarations"
                    )))
                }
            }
        }
    } else {
        flatten_into(&mut staged.before, declarations, profile)?;
    }

    Ok(staged)
}

/// Copies unstaged declarations into `map`; nested groups are rejected.
fn flatten_into(
    map: &mut RouteMap,
    declarations: &RouteDeclarations,
    profile: Profile,
) -> Result<()> {
    match declarations {
        RouteDeclarations::Empty => {}
        RouteDeclarations::Pairs(pairs) => {
            for (source, targets) in pairs {
                insert(map, source, targets);
            }
        }
        RouteDeclarations::Keyed(entries) => {
            for (key, value) in entries {
                match value {
                    DeclaredValue::Targets(targets) => insert(map, key, targets),
                    DeclaredValue::Group(_) => {
                        return Err(RouterError::InvalidDeclaration(format!(
                            "`{key}` cannot be nested in {} route declarations",
                            profile.as_str()
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}

/// A later duplicate replaces the targets but keeps the first position.
fn insert(map: &mut RouteMap, source: &str, targets: &[RouteTarget]) {
    map.insert(canonical_source(source), targets.to_vec());
}

/// Canonical key for a route source: trimmed, method token upper-cased and
/// separated from the path by a single space.
pub(crate) fn canonical_source(source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.starts_with(['/', '=', '~']) {
        return trimmed.to_string();
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((method, path)) => format!("{} {}", method.to_ascii_uppercase(), path.trim_start()),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sources(map: &RouteMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_pairs_keep_order() {
        let declarations = RouteDeclarations::pairs()
            .route("GET /b", "B.run")
            .route("GET /a", "A.run");
        let staged = declarations.normalize(Profile::Plugin).unwrap();
        assert_eq!(sources(&staged.before), vec!["GET /b", "GET /a"]);
        assert!(staged.after.is_empty());
    }

    #[test]
    fn test_plugin_split() {
        let declarations = RouteDeclarations::from_json(&json!({
            "before": {"/admin": "IsAdmin"},
            "after": [["/", "Audit"]]
        }))
        .unwrap();
        let staged = declarations.normalize(Profile::Plugin).unwrap();
        assert_eq!(sources(&staged.before), vec!["/admin"]);
        assert_eq!(sources(&staged.after), vec!["/"]);
    }

    #[test]
    fn test_unknown_key_falls_back_to_before() {
        let declarations = RouteDeclarations::from_json(&json!({
            "/admin": "IsAdmin",
            "/api": ["RateLimit", "Auth"]
        }))
        .unwrap();
        let staged = declarations.normalize(Profile::Plugin).unwrap();
        assert_eq!(sources(&staged.before), vec!["/admin", "/api"]);
        assert_eq!(staged.before["/api"].len(), 2);
    }

    #[test]
    fn test_reserved_stage_in_plugin() {
        let declarations = RouteDeclarations::new()
            .route("/admin", "IsAdmin")
            .stage("early", RouteDeclarations::new().route("/", "Trace"));
        let err = declarations.normalize(Profile::Plugin).unwrap_err();
        assert!(matches!(
            err,
            RouterError::ReservedStage { ref stage, profile: "plugin" } if stage == "early"
        ));
    }

    #[test]
    fn test_application_stages() {
        let declarations = RouteDeclarations::new()
            .stage("early", RouteDeclarations::new().route("/", "Trace"))
            .stage("late", RouteDeclarations::new().route("/", "Log"));
        let staged = declarations.normalize(Profile::Application).unwrap();
        assert_eq!(sources(&staged.early), vec!["/"]);
        assert_eq!(sources(&staged.late), vec!["/"]);
        assert!(staged.before.is_empty());
        assert!(staged.after.is_empty());
    }

    #[test]
    fn test_blueprint_is_not_staged() {
        let declarations = RouteDeclarations::new().route("GET /pets", "Pet.find");
        let staged = declarations.normalize(Profile::Blueprint).unwrap();
        assert_eq!(sources(&staged.before), vec!["GET /pets"]);

        let nested = RouteDeclarations::new()
            .stage("before", RouteDeclarations::new().route("/", "Trace"));
        assert!(matches!(
            nested.normalize(Profile::Blueprint),
            Err(RouterError::InvalidDeclaration(_))
        ));
    }

    #[test]
    fn test_duplicate_source_keeps_first_position() {
        let declarations = RouteDeclarations::new()
            .route("get /a", "First.run")
            .route("GET /b", "B.run")
            .route("GET  /a", "Second.run");
        let staged = declarations.normalize(Profile::Application).unwrap();
        assert_eq!(sources(&staged.before), vec!["GET /a", "GET /b"]);
        match &staged.before["GET /a"][0] {
            RouteTarget::Action { name, .. } => assert_eq!(name, "Second"),
            RouteTarget::Handler(_) => panic!("expected action"),
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(RouteDeclarations::from_json(&json!("GET /a")).is_err());
        assert!(RouteDeclarations::from_json(&json!([["GET /a"]])).is_err());
        assert!(RouteDeclarations::from_json(&json!({"/a": 1})).is_err());
    }

    #[test]
    fn test_canonical_source() {
        assert_eq!(canonical_source("  get   /a "), "GET /a");
        assert_eq!(canonical_source("/a"), "/a");
        assert_eq!(canonical_source("post =/a"), "POST =/a");
    }
}

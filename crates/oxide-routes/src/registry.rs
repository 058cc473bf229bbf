//! Named handler collections that route targets resolve against.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::RouteHandler;

/// Which registry collection a route kind resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Controllers, for terminal routes.
    Controllers,
    /// Policies, for filter routes.
    Policies,
}

impl Collection {
    /// Collection name as used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Controllers => "controllers",
            Self::Policies => "policies",
        }
    }

    fn singular(self) -> &'static str {
        match self {
            Self::Controllers => "controller",
            Self::Policies => "policy",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered component: a single handler or a set of named actions.
#[derive(Clone)]
pub enum Component {
    /// The component itself is the handler (typical for policies).
    Handler(Arc<dyn RouteHandler>),
    /// Named actions (typical for controllers).
    Actions(HashMap<String, Arc<dyn RouteHandler>>),
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Actions(actions) => {
                let mut names: Vec<_> = actions.keys().collect();
                names.sort();
                f.debug_tuple("Actions").field(&names).finish()
            }
        }
    }
}

/// Runtime registry of controllers and policies, keyed by lower-cased
/// identity (`"user"` for a `UserController`).
#[derive(Debug, Clone, Default)]
pub struct Registry {
    controllers: HashMap<String, Component>,
    policies: HashMap<String, Component>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a controller action, creating the controller on first use.
    #[must_use]
    pub fn action(
        mut self,
        controller: &str,
        action: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        let entry = self
            .controllers
            .entry(controller.to_lowercase())
            .or_insert_with(|| Component::Actions(HashMap::new()));
        if let Component::Actions(actions) = entry {
            actions.insert(action.into(), handler);
        } else {
            *entry = Component::Actions([(action.into(), handler)].into_iter().collect());
        }
        self
    }

    /// Registers a controller whose identity is itself the handler.
    #[must_use]
    pub fn controller(mut self, name: &str, handler: Arc<dyn RouteHandler>) -> Self {
        self.controllers
            .insert(name.to_lowercase(), Component::Handler(handler));
        self
    }

    /// Registers a policy.
    #[must_use]
    pub fn policy(mut self, name: &str, handler: Arc<dyn RouteHandler>) -> Self {
        self.policies
            .insert(name.to_lowercase(), Component::Handler(handler));
        self
    }

    /// Registers a policy component with named methods.
    #[must_use]
    pub fn policy_method(
        mut self,
        name: &str,
        method: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        let entry = self
            .policies
            .entry(name.to_lowercase())
            .or_insert_with(|| Component::Actions(HashMap::new()));
        if let Component::Actions(methods) = entry {
            methods.insert(method.into(), handler);
        } else {
            *entry = Component::Actions([(method.into(), handler)].into_iter().collect());
        }
        self
    }

    /// Returns one collection.
    pub fn collection(&self, collection: Collection) -> &HashMap<String, Component> {
        match collection {
            Collection::Controllers => &self.controllers,
            Collection::Policies => &self.policies,
        }
    }

    /// Looks up `identity` (already lower-cased) and optionally one of its
    /// methods. The error is a human-readable reason for the miss.
    pub fn resolve(
        &self,
        collection: Collection,
        identity: &str,
        method: Option<&str>,
    ) -> Result<Arc<dyn RouteHandler>, String> {
        let kind = collection.singular();
        let component = self
            .collection(collection)
            .get(identity)
            .ok_or_else(|| format!("{kind} `{identity}` is not registered"))?;

        match (component, method) {
            (Component::Handler(handler), None) => Ok(Arc::clone(handler)),
            (Component::Handler(_), Some(method)) => Err(format!(
                "{kind} `{identity}` has no method `{method}`"
            )),
            (Component::Actions(actions), Some(method)) => actions
                .get(method)
                .cloned()
                .ok_or_else(|| format!("{kind} `{identity}` has no method `{method}`")),
            (Component::Actions(_), None) => Err(format!(
                "{kind} `{identity}` needs a method to be routed to"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Flow};

    fn noop() -> Arc<dyn RouteHandler> {
        handler_fn(|_req, _res| Box::pin(async { Ok(Flow::Continue) }))
    }

    #[test]
    fn test_resolve_action() {
        let registry = Registry::new()
            .action("User", "find", noop())
            .action("user", "create", noop());

        assert!(registry
            .resolve(Collection::Controllers, "user", Some("find"))
            .is_ok());
        assert!(registry
            .resolve(Collection::Controllers, "user", Some("create"))
            .is_ok());
    }

    #[test]
    fn test_resolve_misses() {
        let registry = Registry::new()
            .action("user", "find", noop())
            .policy("isLoggedIn", noop());

        let err = registry
            .resolve(Collection::Controllers, "pet", Some("find"))
            .err().unwrap();
        assert_eq!(err, "controller `pet` is not registered");

        let err = registry
            .resolve(Collection::Controllers, "user", Some("destroy"))
            .err().unwrap();
        assert_eq!(err, "controller `user` has no method `destroy`");

        assert!(registry
            .resolve(Collection::Controllers, "user", None)
            .is_err());
        assert!(registry
            .resolve(Collection::Policies, "isloggedin", None)
            .is_ok());
    }

    #[test]
    fn test_policy_methods() {
        let registry = Registry::new().policy_method("rate", "strict", noop());
        assert!(registry
            .resolve(Collection::Policies, "rate", Some("strict"))
            .is_ok());
        assert!(registry.resolve(Collection::Policies, "rate", None).is_err());
    }
}

//! Route index: routes grouped by method, then by literal path prefix.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::path::RouteMethod;
use crate::route::{fold_case, CompiledRoute};

/// Routes bucketed by literal path prefix.
///
/// A route sits in the bucket of its own prefix and in every longer bucket
/// one of its example shapes can reach. The bucket chosen for a request path
/// is the longest prefix of that path, so it holds every route that can
/// match it.
#[derive(Debug, Clone)]
pub struct RoutesPerPrefix {
    sensitive: bool,
    routes: Vec<Arc<CompiledRoute>>,
    buckets: IndexMap<String, Vec<Arc<CompiledRoute>>>,
    frozen: bool,
}

impl RoutesPerPrefix {
    /// Creates an empty index. Without `sensitive`, prefixes compare
    /// case-insensitively.
    pub fn new(sensitive: bool) -> Self {
        Self {
            sensitive,
            routes: Vec::new(),
            buckets: IndexMap::new(),
            frozen: false,
        }
    }

    /// Adds a route after every route already present.
    pub fn append(&mut self, route: Arc<CompiledRoute>) -> Result<()> {
        if self.frozen {
            return Err(RouterError::Frozen);
        }
        self.insert(route);
        Ok(())
    }

    fn insert(&mut self, route: Arc<CompiledRoute>) {
        let own = fold_case(route.prefix(), self.sensitive).into_owned();

        if !self.buckets.contains_key(&own) {
            let seeded: Vec<_> = self
                .routes
                .iter()
                .filter(|earlier| belongs(earlier, &own, self.sensitive))
                .cloned()
                .collect();
            self.buckets.insert(own.clone(), seeded);
        }

        for (key, bucket) in &mut self.buckets {
            if *key == own || belongs(&route, key, self.sensitive) {
                bucket.push(Arc::clone(&route));
            }
        }
        self.routes.push(route);
    }

    /// Makes the index read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` once the index is read-only.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The longest registered prefix `path` starts with.
    pub fn longest_matching_prefix(&self, path: &str) -> Option<&str> {
        let path = fold_case(path, self.sensitive);
        self.buckets
            .keys()
            .filter(|prefix| path.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())
            .map(String::as_str)
    }

    /// Candidate routes for `path`, in registration order.
    pub fn routes_for(&self, path: &str) -> &[Arc<CompiledRoute>] {
        self.longest_matching_prefix(path)
            .and_then(|prefix| self.buckets.get(prefix))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Registered prefixes, in creation order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Routes of one bucket.
    pub fn bucket(&self, prefix: &str) -> Option<&[Arc<CompiledRoute>]> {
        self.buckets.get(prefix).map(Vec::as_slice)
    }

    /// Every route, in registration order.
    pub fn routes(&self) -> &[Arc<CompiledRoute>] {
        &self.routes
    }
}

/// Whether `route` has to be a candidate in the bucket keyed `key`.
fn belongs(route: &CompiledRoute, key: &str, sensitive: bool) -> bool {
    let own = fold_case(route.prefix(), sensitive);
    if own == key {
        return true;
    }
    // A shorter bucket is never chosen for a path this route matches.
    !own.starts_with(key) && route.reaches_prefix(key)
}

/// Routes grouped by method.
///
/// A route for every method (`ALL`) is added to each known method bucket and
/// seeds each bucket created later, so its visibility does not depend on
/// registration order. The first lookup converts every bucket into a frozen
/// [`RoutesPerPrefix`]; appends fail from then on.
#[derive(Debug)]
pub struct RoutesPerMethod {
    sensitive: bool,
    methods: IndexMap<String, Vec<Arc<CompiledRoute>>>,
    optimized: OnceLock<HashMap<String, RoutesPerPrefix>>,
}

impl RoutesPerMethod {
    /// Creates an empty index.
    pub fn new(sensitive: bool) -> Self {
        let mut methods = IndexMap::new();
        methods.insert(RouteMethod::ALL.to_string(), Vec::new());
        Self {
            sensitive,
            methods,
            optimized: OnceLock::new(),
        }
    }

    /// Adds a route after every route already present for its method.
    pub fn append(&mut self, route: Arc<CompiledRoute>) -> Result<()> {
        if self.optimized.get().is_some() {
            return Err(RouterError::Frozen);
        }
        match route.method() {
            RouteMethod::All => {
                for bucket in self.methods.values_mut() {
                    bucket.push(Arc::clone(&route));
                }
            }
            RouteMethod::Named(name) => {
                if !self.methods.contains_key(name) {
                    let seed = self
                        .methods
                        .get(RouteMethod::ALL)
                        .cloned()
                        .unwrap_or_default();
                    self.methods.insert(name.clone(), seed);
                }
                if let Some(bucket) = self.methods.get_mut(name) {
                    bucket.push(route);
                }
            }
        }
        Ok(())
    }

    /// Builds the per-prefix index of every method bucket, once.
    pub fn optimize_by_prefix(&self) -> &HashMap<String, RoutesPerPrefix> {
        self.optimized.get_or_init(|| {
            let optimized: HashMap<_, _> = self
                .methods
                .iter()
                .map(|(method, routes)| {
                    let mut index = RoutesPerPrefix::new(self.sensitive);
                    for route in routes {
                        index.insert(Arc::clone(route));
                    }
                    index.freeze();
                    (method.clone(), index)
                })
                .collect();
            debug!(
                methods = optimized.len(),
                prefixes = optimized.values().map(|index| index.buckets.len()).sum::<usize>(),
                "route index optimized"
            );
            optimized
        })
    }

    /// Returns `true` once the per-prefix index has been built.
    pub fn is_optimized(&self) -> bool {
        self.optimized.get().is_some()
    }

    /// Candidate routes for a request. Methods without a bucket of their own
    /// see the `ALL` routes.
    pub fn candidates(&self, method: &str, path: &str) -> &[Arc<CompiledRoute>] {
        let optimized = self.optimize_by_prefix();
        optimized
            .get(method)
            .or_else(|| optimized.get(RouteMethod::ALL))
            .map(|index| index.routes_for(path))
            .unwrap_or_default()
    }

    /// Method buckets, `ALL` first.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Flat routes of one method bucket, in registration order.
    pub fn routes(&self, method: &str) -> Option<&[Arc<CompiledRoute>]> {
        self.methods.get(method).map(Vec::as_slice)
    }

    /// Returns `true` if no route was appended.
    pub fn is_empty(&self) -> bool {
        self.methods.values().all(Vec::is_empty)
    }
}

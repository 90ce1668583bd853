//! The Dependency Registry and its per-run [`DependencyCache`].
//!
//! Dependencies are named async producers, registered once at startup like
//! node types. Each graph run owns a `DependencyCache`, a snapshot of the
//! registry plus a value store that resolves the transitive dependency
//! graph at most once per name for `cache_permanently` entries.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::{FlowError, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether a dependency's resolved value is memoized for the lifetime of its
/// cache, or recomputed on every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Resolved once per cache instance; subsequent resolutions reuse the
    /// stored value.
    CachePermanently,
    /// Re-run the producer on every `resolve` call; the result is never
    /// stored.
    NeverCache,
}

/// A named async producer function. `dependencies` names other producers
/// whose resolved values are passed positionally, in declared order, to
/// `callable`.
#[derive(Clone)]
pub struct Dependency {
    pub name: String,
    pub dependencies: Vec<String>,
    pub callable: Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>,
    pub cache_policy: CachePolicy,
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("cache_policy", &self.cache_policy)
            .finish()
    }
}

static DEPENDENCY_REGISTRY: Lazy<RwLock<HashMap<String, Arc<Dependency>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a dependency producer under `name`.
///
/// `dependencies` lists the names of other registered dependencies this one
/// needs; they are resolved (in declared order) before `callable` is
/// invoked, and passed to it positionally.
pub fn register_dependency(
    name: impl Into<String>,
    cache_policy: CachePolicy,
    dependencies: Vec<impl Into<String>>,
    callable: Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>,
) -> Result<()> {
    let name = name.into();
    let dep = Arc::new(Dependency {
        name: name.clone(),
        dependencies: dependencies.into_iter().map(Into::into).collect(),
        callable,
        cache_policy,
    });

    let mut registry = DEPENDENCY_REGISTRY.write();
    if registry.contains_key(&name) {
        return Err(FlowError::DuplicateRegistration(name));
    }
    registry.insert(name, dep);
    Ok(())
}

/// Snapshot copy of the dependency registry.
pub fn get_all_dependencies() -> HashMap<String, Arc<Dependency>> {
    DEPENDENCY_REGISTRY.read().clone()
}

#[doc(hidden)]
pub fn clear_for_tests() {
    DEPENDENCY_REGISTRY.write().clear();
}

type SharedResolution = Shared<BoxFuture<'static, std::result::Result<Value, Arc<FlowError>>>>;

struct Inner {
    registry: HashMap<String, Arc<Dependency>>,
    values: Mutex<HashMap<String, Value>>,
    in_progress: Mutex<HashMap<String, SharedResolution>>,
}

/// A per-run snapshot of the Dependency Registry plus a value store.
///
/// Cheap to clone: internally an `Arc`, so every task spawned for a run can
/// hold its own handle to the same cache without extra synchronization
/// beyond what `resolve` itself needs.
#[derive(Clone)]
pub struct DependencyCache(Arc<Inner>);

impl DependencyCache {
    /// Builds a cache from the registry as it exists right now.
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            registry: get_all_dependencies(),
            values: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(HashMap::new()),
        }))
    }

    /// Resolves `name` to a value.
    ///
    /// If already cached, returns the cached value. Otherwise resolves every
    /// upstream dependency in declared order and invokes the producer. For
    /// `cache_permanently` entries, the result is stored and concurrent
    /// resolutions of the same name coalesce onto a single producer
    /// invocation via an in-flight table of [`Shared`] futures. `never_cache`
    /// entries skip that table entirely, so each concurrent `resolve` call
    /// runs its own independent producer invocation.
    pub async fn resolve(&self, name: &str) -> Result<Value> {
        self.resolve_along(name, &[]).await
    }

    /// Resolves `name`, tracking the chain of names whose *own* resolution
    /// is currently recursing through this call. `chain` is empty at every
    /// independent top-level `resolve` call, so two unrelated callers
    /// requesting the same dependency concurrently (the diamond-sharing
    /// case `DependencyCache` is built to coalesce) never collide here —
    /// only a name resolving back into itself along one recursive path
    /// does.
    async fn resolve_along(&self, name: &str, chain: &[String]) -> Result<Value> {
        if let Some(v) = self.0.values.lock().get(name).cloned() {
            return Ok(v);
        }
        if chain.iter().any(|seen| seen == name) {
            return Err(FlowError::CyclicDependency(name.to_string()));
        }

        let dep = self
            .0
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownDependency(name.to_string()))?;

        let mut next_chain = chain.to_vec();
        next_chain.push(name.to_string());

        // `never_cache` dependencies skip the in-flight table entirely: two
        // concurrent `resolve` calls for the same name must each invoke the
        // producer independently (TestableProperty 5), not coalesce onto one
        // shared future the way `cache_permanently` entries do.
        if dep.cache_policy == CachePolicy::NeverCache {
            return self.run_dependency(dep, next_chain).await;
        }

        let shared = {
            let mut in_progress = self.0.in_progress.lock();
            if let Some(existing) = in_progress.get(name) {
                existing.clone()
            } else {
                let fresh = self.spawn_resolution(dep.clone(), next_chain);
                in_progress.insert(name.to_string(), fresh.clone());
                fresh
            }
        };

        let outcome = shared.await;
        self.0.in_progress.lock().remove(name);

        let value = outcome.map_err(|e| (*e).clone())?;
        self.0.values.lock().insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Resolves `dep`'s upstream arguments (in declared order) and invokes
    /// its producer. Shared by both the `never_cache` path, which awaits this
    /// directly, and `spawn_resolution`, which wraps it in a [`Shared`]
    /// future for `cache_permanently` coalescing.
    async fn run_dependency(&self, dep: Arc<Dependency>, chain: Vec<String>) -> Result<Value> {
        let mut args = Vec::with_capacity(dep.dependencies.len());
        for upstream in &dep.dependencies {
            let v = self.resolve_along(upstream, &chain).await?;
            args.push(v);
        }
        (dep.callable)(args).await
    }

    fn spawn_resolution(&self, dep: Arc<Dependency>, chain: Vec<String>) -> SharedResolution {
        let this = self.clone();
        let fut: BoxFuture<'static, std::result::Result<Value, Arc<FlowError>>> =
            Box::pin(async move { this.run_dependency(dep, chain).await.map_err(Arc::new) });
        fut.shared()
    }
}

impl Default for DependencyCache {
    fn default() -> Self {
        Self::new()
    }
}

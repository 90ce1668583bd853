//! The Node-Type Registry: a process-wide catalogue mapping node-type names
//! to executable blocks, branching strategy, blocking hint, and parameter
//! metadata.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{FlowError, Result};

/// Positional data arguments passed from a predecessor's output.
pub type Args = Vec<Value>;
/// Keyword-only dependency values resolved from the [`crate::dependency::DependencyCache`].
pub type Kwargs = HashMap<String, Value>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether a node's successors fan out in parallel or are selected one at a
/// time by a match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchingStrategy {
    /// Fan out to every successor.
    Parallel,
    /// Select exactly one successor by a match-key extracted from the
    /// node's output.
    Matcher,
}

/// Whether a node type's callable is safe to run directly on the event loop
/// or must be dispatched to a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingBehavior {
    /// Dispatch to the blocking worker pool ([`tokio::task::spawn_blocking`]).
    Blocking,
    /// Run inline as a plain task; the author asserts it will not stall the
    /// scheduler.
    NonBlocking,
}

/// A user-supplied node callable, either an async producer or a plain
/// function. Async callables are always treated as [`BlockingBehavior::NonBlocking`],
/// regardless of the `blocking_behavior` declared at registration.
#[derive(Clone)]
pub enum NodeFn {
    /// An async callable, invoked directly by the Async Adapter.
    Async(Arc<dyn Fn(Args, Kwargs) -> BoxFuture<'static, Result<Value>> + Send + Sync>),
    /// A plain, synchronous callable, routed through the Async Adapter
    /// according to its [`BlockingBehavior`].
    Blocking(Arc<dyn Fn(Args, Kwargs) -> Result<Value> + Send + Sync>),
}

impl std::fmt::Debug for NodeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeFn::Async(_) => f.write_str("NodeFn::Async(..)"),
            NodeFn::Blocking(_) => f.write_str("NodeFn::Blocking(..)"),
        }
    }
}

/// An immutable registration record binding a name to user code plus its
/// branching, blocking, and parameter metadata.
///
/// `dependency_names` plays the role that reflecting on a function's
/// keyword-only parameters plays in a dynamically typed host language:
/// since a Rust closure carries no reflectable parameter names, the author
/// declares them explicitly at registration time.
#[derive(Debug, Clone)]
pub struct NodeType {
    pub name: String,
    pub callable: NodeFn,
    pub branching_strategy: BranchingStrategy,
    pub blocking_behavior: BlockingBehavior,
    pub input_types: Vec<String>,
    pub output_type: String,
    pub dependency_names: Vec<String>,
}

impl NodeType {
    /// The effective blocking behavior: async callables are always
    /// non-blocking irrespective of the declared value.
    pub fn effective_blocking_behavior(&self) -> BlockingBehavior {
        match self.callable {
            NodeFn::Async(_) => BlockingBehavior::NonBlocking,
            NodeFn::Blocking(_) => self.blocking_behavior,
        }
    }
}

static NODE_TYPE_REGISTRY: Lazy<RwLock<HashMap<String, Arc<NodeType>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a node type under `name`.
///
/// Fails with [`FlowError::DuplicateRegistration`] if `name` is already
/// present. For `BranchingStrategy::Matcher`, `output_type` must describe a
/// 2-tuple (by convention, a string such as `"(String, Value)"`); anything
/// else fails with [`FlowError::InvalidMatcherSignature`]. An empty
/// `output_type` fails with [`FlowError::MissingAnnotation`], mirroring a
/// host language that requires a return annotation.
#[allow(clippy::too_many_arguments)]
pub fn register(
    name: impl Into<String>,
    branching_strategy: BranchingStrategy,
    blocking_behavior: BlockingBehavior,
    callable: NodeFn,
    input_types: Vec<impl Into<String>>,
    output_type: impl Into<String>,
    dependency_names: Vec<impl Into<String>>,
) -> Result<()> {
    let name = name.into();
    let output_type = output_type.into();

    if output_type.trim().is_empty() {
        return Err(FlowError::MissingAnnotation(name));
    }

    if branching_strategy == BranchingStrategy::Matcher && !looks_like_pair(&output_type) {
        return Err(FlowError::InvalidMatcherSignature(name));
    }

    let node_type = Arc::new(NodeType {
        name: name.clone(),
        callable,
        branching_strategy,
        blocking_behavior,
        input_types: input_types.into_iter().map(Into::into).collect(),
        output_type,
        dependency_names: dependency_names.into_iter().map(Into::into).collect(),
    });

    let mut registry = NODE_TYPE_REGISTRY.write();
    if registry.contains_key(&name) {
        return Err(FlowError::DuplicateRegistration(name));
    }
    registry.insert(name, node_type);
    Ok(())
}

/// Metadata-only check that an output type looks like a `(key, data)` pair.
/// Since node-type output types are documentation strings rather than
/// reflectable Rust types, this is necessarily a heuristic: it is used only
/// to catch the obvious case of a matcher node registered with a bare,
/// non-paired type.
fn looks_like_pair(output_type: &str) -> bool {
    let trimmed = output_type.trim();
    trimmed.starts_with('(') && trimmed.ends_with(')') && trimmed.contains(',')
}

/// Returns a snapshot copy of the registry as it exists right now.
///
/// Graphs bind [`NodeType`]s at construction time via this snapshot and are
/// insulated from registrations that happen afterward.
pub fn get_all() -> HashMap<String, Arc<NodeType>> {
    NODE_TYPE_REGISTRY.read().clone()
}

/// Looks up a single node type by name, as of right now.
pub fn get(name: &str) -> Option<Arc<NodeType>> {
    NODE_TYPE_REGISTRY.read().get(name).cloned()
}

/// Sugar over [`register`] for the common case of a blocking, parallel node
/// type with no declared dependencies, closer to the terse decorator-style
/// spelling of a registration in the reference language.
///
/// ```
/// cflow_core::nodetype!("double", |args, _kwargs| {
///     Ok(serde_json::Value::from(args[0].as_i64().unwrap_or(0) * 2))
/// } => "i64").unwrap();
/// ```
#[macro_export]
macro_rules! nodetype {
    ($name:expr, $callable:expr => $output_type:expr) => {
        $crate::node_type::register(
            $name,
            $crate::node_type::BranchingStrategy::Parallel,
            $crate::node_type::BlockingBehavior::Blocking,
            $crate::node_type::NodeFn::Blocking(std::sync::Arc::new($callable)),
            Vec::<&str>::new(),
            $output_type,
            Vec::<&str>::new(),
        )
    };
    ($name:expr, $callable:expr => $output_type:expr, deps: [$($dep:expr),* $(,)?]) => {
        $crate::node_type::register(
            $name,
            $crate::node_type::BranchingStrategy::Parallel,
            $crate::node_type::BlockingBehavior::Blocking,
            $crate::node_type::NodeFn::Blocking(std::sync::Arc::new($callable)),
            Vec::<&str>::new(),
            $output_type,
            vec![$($dep),*],
        )
    };
}

/// Removes every registration. Exposed for test isolation only: production
/// code registers at startup and never tears the registry down.
#[doc(hidden)]
pub fn clear_for_tests() {
    NODE_TYPE_REGISTRY.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test_helper::serial;

    mod serial_test_helper {
        use parking_lot::Mutex;
        pub static LOCK: Mutex<()> = Mutex::new(());

        pub fn serial<F: FnOnce()>(f: F) {
            let _guard = LOCK.lock();
            f();
        }
    }

    fn noop_callable() -> NodeFn {
        NodeFn::Blocking(Arc::new(|_args, _kwargs| Ok(Value::Null)))
    }

    #[test]
    fn register_and_fetch() {
        serial(|| {
            clear_for_tests();
            register(
                "greet",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                vec!["String"],
                "String",
                Vec::<&str>::new(),
            )
            .unwrap();

            let nt = get("greet").expect("registered");
            assert_eq!(nt.name, "greet");
            assert_eq!(nt.branching_strategy, BranchingStrategy::Parallel);
        });
    }

    #[test]
    fn duplicate_registration_fails() {
        serial(|| {
            clear_for_tests();
            register(
                "dup",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "String",
                Vec::<&str>::new(),
            )
            .unwrap();

            let err = register(
                "dup",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "String",
                Vec::<&str>::new(),
            )
            .unwrap_err();
            assert!(matches!(err, FlowError::DuplicateRegistration(_)));
        });
    }

    #[test]
    fn missing_annotation_fails() {
        serial(|| {
            clear_for_tests();
            let err = register(
                "blank",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "",
                Vec::<&str>::new(),
            )
            .unwrap_err();
            assert!(matches!(err, FlowError::MissingAnnotation(_)));
        });
    }

    #[test]
    fn matcher_requires_pair_output() {
        serial(|| {
            clear_for_tests();
            let err = register(
                "router",
                BranchingStrategy::Matcher,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "String",
                Vec::<&str>::new(),
            )
            .unwrap_err();
            assert!(matches!(err, FlowError::InvalidMatcherSignature(_)));

            register(
                "router2",
                BranchingStrategy::Matcher,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "(String, Value)",
                Vec::<&str>::new(),
            )
            .unwrap();
        });
    }

    #[test]
    fn get_all_is_a_snapshot() {
        serial(|| {
            clear_for_tests();
            register(
                "a",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "String",
                Vec::<&str>::new(),
            )
            .unwrap();
            let snapshot = get_all();
            register(
                "b",
                BranchingStrategy::Parallel,
                BlockingBehavior::Blocking,
                noop_callable(),
                Vec::<&str>::new(),
                "String",
                Vec::<&str>::new(),
            )
            .unwrap();
            assert_eq!(snapshot.len(), 1);
            assert_eq!(get_all().len(), 2);
        });
    }
}

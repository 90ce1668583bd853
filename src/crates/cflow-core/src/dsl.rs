//! An in-language graph-definition builder.
//!
//! This is the thin, external-collaborator counterpart to the DOT file
//! adapter in `cflow-dot`: rather than parsing a `.gv` file, a graph is
//! declared directly in Rust by naming node-type occurrences and chaining
//! them with `>>`, producing the same [`crate::graph::Graph`] the DOT
//! adapter builds. Keyed (matcher) edges use [`NodeRef::branch`] instead of
//! the operator, since an edge's match-key is extra information a binary
//! operator alone cannot carry.
//!
//! ```no_run
//! use cflow_core::dsl::GraphBuilder;
//!
//! let builder = GraphBuilder::new();
//! let start = builder.node("start", "emit_name");
//! let hail = builder.node("hail", "hail_handler");
//! let generic = builder.node("generic", "generic_handler");
//! let router = builder.node("router", "route_by_key");
//!
//! let _ = start >> router.clone();
//! router.branch("1", hail);
//! router.branch("2", generic);
//! let graph = builder.build().unwrap();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Shr;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::graph::{Edges, Graph, Node};
use crate::node_type;

#[derive(Default)]
struct PendingEdges {
    parallel: Vec<String>,
    matcher: HashMap<String, String>,
}

struct BuilderState {
    /// node-name -> type-name
    declarations: HashMap<String, String>,
    /// node-name -> its outgoing edges, accumulated as the DSL is chained
    edges: HashMap<String, PendingEdges>,
    order: Vec<String>,
}

/// Accumulates node declarations and edges as a graph is described in Rust.
#[derive(Clone)]
pub struct GraphBuilder {
    state: Rc<RefCell<BuilderState>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BuilderState {
                declarations: HashMap::new(),
                edges: HashMap::new(),
                order: Vec::new(),
            })),
        }
    }

    /// Declares a node named `name` as an occurrence of the node type
    /// `type_name`, returning a handle that can be chained with `>>` to
    /// describe edges.
    pub fn node(&self, name: impl Into<String>, type_name: impl Into<String>) -> NodeRef {
        let name = name.into();
        let mut state = self.state.borrow_mut();
        state.declarations.insert(name.clone(), type_name.into());
        state.edges.entry(name.clone()).or_default();
        state.order.push(name.clone());
        NodeRef { builder: self.state.clone(), name }
    }

    /// Resolves every declaration and edge against the current Node-Type
    /// Registry snapshot, producing a [`Graph`]. Fails with
    /// [`FlowError::UnknownNodeType`] if a declared type-name has no
    /// registration, or [`FlowError::UnknownSuccessor`] if an edge targets a
    /// node that was never declared. Since edges name their successors
    /// rather than holding them directly, nodes are built in a single pass
    /// in declaration order; declared cycles (an edge pointing back at an
    /// ancestor) build and run just as well as a DAG.
    pub fn build(&self) -> Result<Graph> {
        let state = self.state.borrow();
        let registry = node_type::get_all();

        for edges in state.edges.values() {
            for succ_name in edges.parallel.iter().chain(edges.matcher.values()) {
                if !state.declarations.contains_key(succ_name) {
                    return Err(FlowError::UnknownSuccessor(succ_name.clone()));
                }
            }
        }

        let mut nodes: HashMap<String, Arc<Node>> = HashMap::with_capacity(state.order.len());
        for name in &state.order {
            let type_name = &state.declarations[name];
            let node_type = registry
                .get(type_name)
                .cloned()
                .ok_or_else(|| FlowError::UnknownNodeType(type_name.clone()))?;

            let edges = match state.edges.get(name) {
                Some(pending) if !pending.matcher.is_empty() => Edges::Matcher(pending.matcher.clone()),
                Some(pending) => Edges::Parallel(pending.parallel.clone()),
                None => Edges::Parallel(vec![]),
            };

            nodes.insert(
                name.clone(),
                Arc::new(Node { name: name.clone(), type_name: type_name.clone(), node_type, edges }),
            );
        }
        Ok(Graph { nodes })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to one node declared in a [`GraphBuilder`].
///
/// `a >> b` declares a plain edge from `a` to `b` and returns `b`, so edges
/// chain: `a >> b >> c`. For a keyed (matcher) edge, use [`NodeRef::branch`]
/// instead.
#[derive(Clone)]
pub struct NodeRef {
    builder: Rc<RefCell<BuilderState>>,
    pub name: String,
}

impl NodeRef {
    /// Declares a matcher edge from this node to `destination` under
    /// `match_key`.
    pub fn branch(&self, match_key: impl Into<String>, destination: NodeRef) -> NodeRef {
        let mut state = self.builder.borrow_mut();
        state
            .edges
            .entry(self.name.clone())
            .or_default()
            .matcher
            .insert(match_key.into(), destination.name.clone());
        destination
    }
}

impl Shr<NodeRef> for NodeRef {
    type Output = NodeRef;

    fn shr(self, destination: NodeRef) -> NodeRef {
        let mut state = self.builder.borrow_mut();
        state
            .edges
            .entry(self.name.clone())
            .or_default()
            .parallel
            .push(destination.name.clone());
        destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::{BlockingBehavior, BranchingStrategy, NodeFn};
    use parking_lot::Mutex;
    use serde_json::Value;

    fn register_noop(name: &str) {
        let _ = node_type::register(
            name,
            BranchingStrategy::Parallel,
            BlockingBehavior::Blocking,
            NodeFn::Blocking(Arc::new(|_a, _k| Ok(Value::Null))),
            Vec::<&str>::new(),
            "()",
            Vec::<&str>::new(),
        );
    }

    static LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn shr_chains_parallel_edges() {
        let _guard = LOCK.lock();
        node_type::clear_for_tests();
        register_noop("t");

        let builder = GraphBuilder::new();
        let a = builder.node("a", "t");
        let b = builder.node("b", "t");
        let c = builder.node("c", "t");
        let _ = a >> b >> c;

        let graph = builder.build().unwrap();
        match &graph.nodes["a"].edges {
            Edges::Parallel(succ) => assert_eq!(succ[0], "b"),
            _ => panic!("expected parallel edges"),
        }
        match &graph.nodes["b"].edges {
            Edges::Parallel(succ) => assert_eq!(succ[0], "c"),
            _ => panic!("expected parallel edges"),
        }
    }

    #[test]
    fn branch_declares_keyed_edges() {
        let _guard = LOCK.lock();
        node_type::clear_for_tests();
        register_noop("t");

        let builder = GraphBuilder::new();
        let router = builder.node("router", "t");
        let hail = builder.node("hail", "t");
        let generic = builder.node("generic", "t");
        router.branch("1", hail);
        router.branch("2", generic);

        let graph = builder.build().unwrap();
        match &graph.nodes["router"].edges {
            Edges::Matcher(branches) => {
                assert_eq!(branches["1"], "hail");
                assert_eq!(branches["2"], "generic");
            }
            _ => panic!("expected matcher edges"),
        }
    }

    #[test]
    fn declared_loop_builds_successfully() {
        let _guard = LOCK.lock();
        node_type::clear_for_tests();
        register_noop("t");

        let builder = GraphBuilder::new();
        let a = builder.node("a", "t");
        let b = builder.node("b", "t");
        let _ = a.clone() >> b >> a;

        let graph = builder.build().unwrap();
        match &graph.nodes["b"].edges {
            Edges::Parallel(succ) => assert_eq!(succ[0], "a"),
            _ => panic!("expected parallel edges"),
        }
    }

    #[test]
    fn unknown_type_fails_to_build() {
        let _guard = LOCK.lock();
        node_type::clear_for_tests();

        let builder = GraphBuilder::new();
        builder.node("a", "does-not-exist");
        let err = builder.build().unwrap_err();
        assert!(matches!(err, FlowError::UnknownNodeType(_)));
    }
}

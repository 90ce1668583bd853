//! The graph data model: [`Node`], its polymorphic [`Edges`], and [`Graph`]
//! itself.
//!
//! A matcher node and a parallel node differ only in how they read their
//! own output and route to successors; both are represented as a single
//! `Node` struct with the variance captured in the `Edges` enum rather than
//! an inheritance hierarchy.
//!
//! Edges name their successors rather than holding `Arc<Node>` directly.
//! `Node` values are immutable once built, so a literal `Arc<Node>` cycle
//! (a node whose own successor, transitively, is itself) could only be
//! constructed by leaking one of the strong references; naming successors
//! and resolving them through the owning [`Graph`] at dispatch time sidesteps
//! that entirely and lets the data model support real cycles, as the
//! scheduler never walks the graph as a whole (each `execute_node` task
//! looks only at its own node's edges).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter;
use crate::error::Result;
use crate::node_type::{Args, Kwargs, NodeType};

/// A node's successors, keyed by branching strategy. Entries name
/// successors by their node name within the owning [`Graph`]; resolve them
/// with [`Graph::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edges {
    /// Fan out to every successor in order.
    Parallel(Vec<String>),
    /// Select a single successor by a match-key.
    Matcher(HashMap<String, String>),
}

impl Edges {
    fn is_empty(&self) -> bool {
        match self {
            Edges::Parallel(v) => v.is_empty(),
            Edges::Matcher(m) => m.is_empty(),
        }
    }
}

/// A unique occurrence of a [`NodeType`] in a graph.
///
/// The same node name may appear as a successor of multiple predecessors
/// (reconvergence), and a node's successors may loop back to an ancestor
/// (a true cycle) since edges reference successors by name rather than by
/// direct handle.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub type_name: String,
    pub node_type: Arc<NodeType>,
    pub edges: Edges,
}

impl Node {
    /// Invokes this node's bound callable through the Async Adapter.
    pub async fn invoke(&self, args: Args, kwargs: Kwargs) -> Result<Value> {
        adapter::ensure_awaitable(&self.node_type, args, kwargs).await
    }

    /// Extracts the data portion of a raw callable output. For a matcher
    /// node, the raw output is expected to be a 2-element JSON array
    /// `[match_key, data]`; the data is `raw[1]`. For a parallel node, the
    /// raw output *is* the data.
    pub fn extract_data(&self, raw: &Value) -> Value {
        match &self.edges {
            Edges::Parallel(_) => raw.clone(),
            Edges::Matcher(_) => raw
                .as_array()
                .and_then(|pair| pair.get(1))
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    /// Whether this node has at least one successor edge.
    pub fn has_successors(&self) -> bool {
        !self.edges.is_empty()
    }

    /// The names of the successors to fan out to, given this invocation's
    /// raw output. A matcher node whose match-key has no corresponding edge
    /// returns an empty list: this is not an error, it terminates the
    /// branch (matcher nodes may be used as filters).
    pub fn next(&self, raw: &Value) -> Vec<String> {
        match &self.edges {
            Edges::Parallel(successors) => successors.clone(),
            Edges::Matcher(branches) => {
                let key = raw.as_array().and_then(|pair| pair.first()).and_then(Value::as_str);
                match key.and_then(|k| branches.get(k)) {
                    Some(name) => vec![name.clone()],
                    None => vec![],
                }
            }
        }
    }
}

/// A mapping from node-name to [`Node`]. Contains every referenced
/// successor. The start-node name is supplied externally per invocation,
/// not stored in the graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: HashMap<String, Arc<Node>>,
}

impl Graph {
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::{BlockingBehavior, BranchingStrategy, NodeFn};

    fn dummy_node_type(strategy: BranchingStrategy) -> Arc<NodeType> {
        Arc::new(NodeType {
            name: "t".into(),
            callable: NodeFn::Blocking(Arc::new(|_, _| Ok(Value::Null))),
            branching_strategy: strategy,
            blocking_behavior: BlockingBehavior::Blocking,
            input_types: vec![],
            output_type: "Value".into(),
            dependency_names: vec![],
        })
    }

    fn leaf(name: &str) -> Node {
        Node {
            name: name.into(),
            type_name: "t".into(),
            node_type: dummy_node_type(BranchingStrategy::Parallel),
            edges: Edges::Parallel(vec![]),
        }
    }

    #[test]
    fn parallel_extract_data_is_identity() {
        let node = leaf("a");
        let raw = Value::from("x");
        assert_eq!(node.extract_data(&raw), raw);
    }

    #[test]
    fn matcher_extract_data_is_second_element() {
        let node = Node {
            name: "m".into(),
            type_name: "t".into(),
            node_type: dummy_node_type(BranchingStrategy::Matcher),
            edges: Edges::Matcher(HashMap::new()),
        };
        let raw = Value::from(vec![Value::from("1"), Value::from("Guido")]);
        assert_eq!(node.extract_data(&raw), Value::from("Guido"));
    }

    #[test]
    fn matcher_miss_yields_no_successors() {
        let mut branches = HashMap::new();
        branches.insert("1".to_string(), "hail".to_string());
        let node = Node {
            name: "m".into(),
            type_name: "t".into(),
            node_type: dummy_node_type(BranchingStrategy::Matcher),
            edges: Edges::Matcher(branches),
        };
        let raw = Value::from(vec![Value::from("3"), Value::from("Anyone")]);
        assert!(node.next(&raw).is_empty());
    }

    #[test]
    fn matcher_hit_selects_one_successor() {
        let mut branches = HashMap::new();
        branches.insert("1".to_string(), "hail".to_string());
        branches.insert("2".to_string(), "generic".to_string());
        let node = Node {
            name: "m".into(),
            type_name: "t".into(),
            node_type: dummy_node_type(BranchingStrategy::Matcher),
            edges: Edges::Matcher(branches),
        };
        let raw = Value::from(vec![Value::from("1"), Value::from("Guido")]);
        let next = node.next(&raw);
        assert_eq!(next, vec!["hail".to_string()]);
    }

    #[test]
    fn parallel_fans_out_to_all_successors() {
        let node = Node {
            name: "a".into(),
            type_name: "t".into(),
            node_type: dummy_node_type(BranchingStrategy::Parallel),
            edges: Edges::Parallel(vec!["b".into(), "c".into()]),
        };
        assert_eq!(node.next(&Value::Null).len(), 2);
        assert!(node.has_successors());
    }

    #[test]
    fn terminal_node_has_no_successors() {
        let node = leaf("z");
        assert!(!node.has_successors());
        assert!(node.next(&Value::Null).is_empty());
    }
}

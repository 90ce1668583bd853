//! Adapts a DOT (Graphviz) graph definition into a [`cflow_core::Graph`].
//!
//! Parsing itself is delegated to `graphviz-rust`/`dot-structures`; this
//! crate's job starts where theirs ends, walking the parsed AST and binding
//! it against the live Node-Type Registry.
//!
//! Node attribute `type` names a registered node type; a node missing it is
//! silently skipped (it is not part of the control-flow graph, e.g. a
//! `rankdir` styling hint). Edge attribute `value` supplies the match-key
//! for an edge leaving a matcher-strategy node; a matcher edge missing it is
//! installed under the empty string.

use std::collections::HashMap;
use std::sync::Arc;

use dot_structures::{Attribute, Edge, EdgeTy, Graph as DotGraph, Id, Node as DotNode, Stmt, Vertex};
use thiserror::Error;

use cflow_core::error::FlowError;
use cflow_core::graph::{Edges, Graph, Node};
use cflow_core::node_type::{self, BranchingStrategy};

const NODE_TYPE_ATTRIBUTE: &str = "type";
const MATCH_VALUE_ATTRIBUTE: &str = "value";

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DotError>;

/// Errors specific to adapting a DOT source into the core graph model.
#[derive(Debug, Clone, Error)]
pub enum DotError {
    /// The underlying DOT parser rejected the source text.
    #[error("failed to parse DOT source: {0}")]
    Parse(String),

    /// A graph-construction error from the core (unknown node type, unknown
    /// successor).
    #[error(transparent)]
    Graph(#[from] FlowError),
}

/// Parses `source` as a DOT document and builds a [`Graph`] from it.
pub fn parse_str(source: &str) -> Result<Graph> {
    let dot_graph = graphviz_rust::parse(source).map_err(DotError::Parse)?;
    build_graph(&dot_graph)
}

/// Reads `path` and builds a [`Graph`] from its DOT contents.
pub fn parse_file(path: impl AsRef<std::path::Path>) -> Result<Graph> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| DotError::Parse(format!("{}: {e}", path.as_ref().display())))?;
    parse_str(&contents)
}

/// Synchronous top-level entry point: reads `graph_path` as a DOT file,
/// builds a graph against the Node-Type Registry as it stands, and runs it
/// to completion on a fresh single-threaded runtime.
///
/// Mirrors the reference implementation's module-level `run(graph_filename,
/// start_node_name)`, which owns both the DOT parse and the event loop; the
/// node types referenced by the graph must already be registered by the
/// caller before this is invoked.
pub fn run(graph_path: impl AsRef<std::path::Path>, start_name: &str) -> Result<serde_json::Value> {
    run_with_config(graph_path, &cflow_core::config::RunConfig {
        start_node: start_name.to_string(),
        cache_usage: cflow_core::config::CacheUsageConfig::Shared,
        blocking_threads: None,
    })
}

/// Like [`run`], but driven by a [`cflow_core::config::RunConfig`] rather
/// than a bare start-node name, so callers that load their run settings
/// from a YAML file (see `cflow-cli`'s `--config` flag) get the same entry
/// point.
pub fn run_with_config(
    graph_path: impl AsRef<std::path::Path>,
    config: &cflow_core::config::RunConfig,
) -> Result<serde_json::Value> {
    let graph = parse_file(graph_path)?;
    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_all();
    if let Some(threads) = config.blocking_threads {
        builder.max_blocking_threads(threads);
    }
    let runtime = builder.build().map_err(|e| DotError::Parse(format!("failed to start runtime: {e}")))?;
    runtime
        .block_on(cflow_core::run_graph(
            Arc::new(graph),
            &config.start_node,
            vec![],
            config.cache_usage.into(),
        ))
        .map_err(DotError::from)
}

fn stmts_of(graph: &DotGraph) -> &[Stmt] {
    match graph {
        DotGraph::Graph { stmts, .. } => stmts,
        DotGraph::DiGraph { stmts, .. } => stmts,
    }
}

fn id_text(id: &Id) -> String {
    match id {
        Id::Html(s) | Id::Escaped(s) | Id::Plain(s) | Id::Anonymous(s) => {
            s.trim_matches('"').to_string()
        }
    }
}

fn attr_value<'a>(attributes: &'a [Attribute], key: &str) -> Option<&'a Id> {
    attributes.iter().find(|Attribute(id, _)| id_text(id) == key).map(|Attribute(_, v)| v)
}

struct PendingEdges {
    parallel: Vec<String>,
    matcher: HashMap<String, String>,
}

/// Walks a parsed DOT AST and builds the core [`Graph`] from it, binding
/// node `type` attributes against the Node-Type Registry as it exists right
/// now. Nodes without a `type` attribute are skipped, mirroring a DOT file
/// that uses undecorated nodes for layout hints (e.g. rank groups). Edges
/// name their successors rather than holding them directly, so a DOT source
/// with a cycle (an edge back to an ancestor) builds in this single pass
/// just as readily as a DAG.
pub fn build_graph(dot_graph: &DotGraph) -> Result<Graph> {
    let registry = node_type::get_all();
    let stmts = stmts_of(dot_graph);

    let mut type_names: HashMap<String, String> = HashMap::new();
    for stmt in stmts {
        if let Stmt::Node(DotNode { id, attributes }) = stmt {
            let name = id_text(&id.0);
            if let Some(type_id) = attr_value(attributes, NODE_TYPE_ATTRIBUTE) {
                type_names.insert(name, id_text(type_id));
            }
        }
    }

    let mut pending: HashMap<String, PendingEdges> = type_names
        .keys()
        .map(|name| (name.clone(), PendingEdges { parallel: Vec::new(), matcher: HashMap::new() }))
        .collect();

    for stmt in stmts {
        if let Stmt::Edge(Edge { ty, attributes }) = stmt {
            for (source_name, dest_name) in edge_pairs(ty) {
                if !type_names.contains_key(&source_name) {
                    continue;
                }
                if !type_names.contains_key(&dest_name) {
                    return Err(FlowError::UnknownSuccessor(dest_name).into());
                }

                let source_type_name = &type_names[&source_name];
                let source_is_matcher = registry
                    .get(source_type_name)
                    .map(|nt| nt.branching_strategy == BranchingStrategy::Matcher)
                    .unwrap_or(false);

                let entry = pending.entry(source_name).or_insert_with(|| PendingEdges {
                    parallel: Vec::new(),
                    matcher: HashMap::new(),
                });
                if source_is_matcher {
                    let key = attr_value(attributes, MATCH_VALUE_ATTRIBUTE)
                        .map(id_text)
                        .unwrap_or_default();
                    entry.matcher.insert(key, dest_name);
                } else {
                    entry.parallel.push(dest_name);
                }
            }
        }
    }

    let mut nodes: HashMap<String, Arc<Node>> = HashMap::with_capacity(type_names.len());
    let empty = PendingEdges { parallel: Vec::new(), matcher: HashMap::new() };
    for (name, type_name) in &type_names {
        let node_type = registry
            .get(type_name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownNodeType(type_name.clone()))?;

        let edges_spec = pending.get(name).unwrap_or(&empty);
        let edges = if node_type.branching_strategy == BranchingStrategy::Matcher {
            Edges::Matcher(edges_spec.matcher.clone())
        } else {
            Edges::Parallel(edges_spec.parallel.clone())
        };

        nodes.insert(
            name.clone(),
            Arc::new(Node { name: name.clone(), type_name: type_name.clone(), node_type, edges }),
        );
    }
    Ok(Graph { nodes })
}

fn edge_pairs(ty: &EdgeTy) -> Vec<(String, String)> {
    fn vertex_name(v: &Vertex) -> Option<String> {
        match v {
            Vertex::N(node_id) => Some(id_text(&node_id.0)),
            Vertex::S(_) => None,
        }
    }

    match ty {
        EdgeTy::Pair(a, b) => match (vertex_name(a), vertex_name(b)) {
            (Some(a), Some(b)) => vec![(a, b)],
            _ => vec![],
        },
        EdgeTy::Chain(vertices) => vertices
            .iter()
            .filter_map(vertex_name)
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| (w[0].clone(), w[1].clone()))
            .collect(),
    }
}

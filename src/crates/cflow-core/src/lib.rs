//! # cflow-core
//!
//! A concurrent control-flow-graph execution engine. An application
//! expresses its logic as a directed graph: nodes hold user-supplied code
//! blocks, edges denote possible successors, and a runtime walks the graph,
//! invoking each block and scheduling successors concurrently.
//!
//! # Modules
//!
//! - [`node_type`] — the Node-Type Registry: node-type names, branching
//!   strategy, blocking hint, and parameter metadata.
//! - [`dependency`] — the Dependency Registry and per-run
//!   [`dependency::DependencyCache`].
//! - [`graph`] — the [`graph::Node`]/[`graph::Graph`] data model.
//! - [`adapter`] — the Async Adapter, converting blocking and non-blocking
//!   user callables into awaitables.
//! - [`tracker`] — the [`tracker::BranchTracker`] completion barrier.
//! - [`scheduler`] — [`scheduler::run_graph`] and the internal
//!   `execute_node` loop.
//! - [`dsl`] — an in-language graph-definition builder using operator
//!   overloading for edges.
//! - [`config`] — the small, `serde`-deserialized configuration struct
//!   shared by the CLI and graph-source adapters.
//!
//! # Example
//!
//! ```no_run
//! use cflow_core::node_type::{self, BranchingStrategy, BlockingBehavior, NodeFn};
//! use cflow_core::graph::{Edges, Graph, Node};
//! use cflow_core::scheduler::{run_graph, CacheUsage};
//! use serde_json::Value;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> cflow_core::error::Result<()> {
//! node_type::register(
//!     "greet",
//!     BranchingStrategy::Parallel,
//!     BlockingBehavior::Blocking,
//!     NodeFn::Blocking(Arc::new(|args, _kwargs| {
//!         println!("Welcome {}!", args[0].as_str().unwrap_or_default());
//!         Ok(Value::Null)
//!     })),
//!     Vec::<&str>::new(),
//!     "()",
//!     Vec::<&str>::new(),
//! )?;
//!
//! let greet_type = node_type::get("greet").unwrap();
//! let greet_node = Arc::new(Node {
//!     name: "greet".into(),
//!     type_name: "greet".into(),
//!     node_type: greet_type,
//!     edges: Edges::Parallel(vec![]),
//! });
//! let mut nodes = HashMap::new();
//! nodes.insert("greet".to_string(), greet_node);
//! let graph = Arc::new(Graph { nodes });
//!
//! run_graph(graph, "greet", vec![Value::from("Guido")], CacheUsage::Shared).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod dependency;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod node_type;
pub mod scheduler;
pub mod tracker;

pub use error::{FlowError, Result};
pub use graph::{Edges, Graph, Node};
pub use scheduler::{run_graph, run_subgraph, CacheUsage};

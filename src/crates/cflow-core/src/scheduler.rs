//! The scheduler: `run_graph` and `execute_node`.
//!
//! Walks the graph, invokes nodes through the Async Adapter, fans out to
//! successors as independent tasks, and manages the per-run dependency
//! cache via an ambient task-local context.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dependency::DependencyCache;
use crate::error::{FlowError, Result};
use crate::graph::{Graph, Node};
use crate::tracker::BranchTracker;

/// Wraps a spawned branch task's `JoinHandle`, aborting it on drop rather
/// than letting it detach and run to completion. `tokio::spawn` itself
/// returns a handle that does nothing on drop; this is the newtype that
/// makes dropping the handle actually cancel the task.
struct AbortOnDropHandle(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDropHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

tokio::task_local! {
    /// The ambient dependency cache for the run currently executing on this
    /// task. Never a process-global: each `run_graph` call installs its own
    /// handle, and every task the scheduler spawns re-installs it
    /// explicitly so the ambient value is genuinely inherited rather than
    /// accidentally shared across unrelated runs.
    static CURRENT_CACHE: DependencyCache;
}

/// Whether a graph run shares the enclosing run's dependency cache or
/// starts with a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheUsage {
    /// Reuse the ambient cache installed by an enclosing run, if any;
    /// otherwise create a fresh one. Cached dependency values are reused
    /// across nested (subgraph) runs.
    #[default]
    Shared,
    /// Always install a fresh cache for this run only.
    Independent,
}

/// Returns the dependency cache ambient to the currently executing task, if
/// any is installed.
fn ambient_cache() -> Option<DependencyCache> {
    CURRENT_CACHE.try_with(|c| c.clone()).ok()
}

fn cache_for(usage: CacheUsage) -> DependencyCache {
    match usage {
        CacheUsage::Shared => ambient_cache().unwrap_or_default(),
        CacheUsage::Independent => DependencyCache::new(),
    }
}

/// Converts a node's raw output data into the next node's positional input
/// tuple: `Value::Null` or a single-element array holding `Value::Null`
/// becomes no arguments; any other JSON array is passed through as-is (the
/// tuple-as-is rule); anything else becomes a single argument.
pub fn convert_output_to_input(data: Value) -> Vec<Value> {
    match data {
        Value::Null => vec![],
        Value::Array(items) if items.len() == 1 && items[0] == Value::Null => vec![],
        Value::Array(items) => items,
        other => vec![other],
    }
}

struct RunState {
    tracker: Arc<BranchTracker>,
    terminal: Mutex<Option<Value>>,
    failure: Mutex<Option<FlowError>>,
    /// Every branch task this run spawns sends its `AbortOnDropHandle`
    /// here. The matching receiver lives only in `run_graph`'s own stack
    /// frame, so dropping `run_graph`'s future (the cancellation path: a
    /// `tokio::select!` racing a ctrl-c signal, or a subgraph caller
    /// dropping the awaiting future) drops the receiver and with it every
    /// handle buffered in the channel, aborting every outstanding branch
    /// instead of leaking them detached. Handles are never received for
    /// any other reason — on the normal-completion path the receiver just
    /// drops at the end of `run_graph`, aborting tasks that have already
    /// finished, which is a no-op.
    branch_handles: mpsc::UnboundedSender<AbortOnDropHandle>,
}

impl RunState {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<AbortOnDropHandle>) {
        let (branch_handles, handle_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            tracker: Arc::new(BranchTracker::new()),
            terminal: Mutex::new(None),
            failure: Mutex::new(None),
            branch_handles,
        });
        (state, handle_rx)
    }

    fn record_terminal(&self, value: Value) {
        // Policy (see DESIGN.md): a run with multiple terminal branches
        // returns the *last* terminal value observed. Concurrent branches
        // are not ordered relative to one another, so "last" here means
        // last to record, not last in any graph-defined sense.
        *self.terminal.lock() = Some(value);
    }

    fn record_failure(&self, err: FlowError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// Runs `graph` starting at `start_name`, returning the terminal value of
/// the run.
///
/// Installs (or inherits, per `cache_usage`) a [`DependencyCache`] as the
/// ambient context for every task this run spawns, seeds a [`BranchTracker`]
/// with one live branch, and awaits its completion. If any branch fails
/// with [`FlowError::UserCodeFailure`] (or a scheduler-internal error), that
/// failure is returned to the caller; sibling branches are allowed to run
/// to completion rather than being cancelled (see DESIGN.md). If this
/// future itself is dropped before completion (the caller races it against
/// a ctrl-c signal, or a subgraph's awaiter is itself cancelled), every
/// outstanding branch task is aborted rather than left to run detached.
#[tracing::instrument(skip(graph, start_args), fields(start = %start_name))]
pub async fn run_graph(
    graph: Arc<Graph>,
    start_name: &str,
    start_args: Vec<Value>,
    cache_usage: CacheUsage,
) -> Result<Value> {
    let start_node = graph
        .get(start_name)
        .ok_or_else(|| FlowError::UnknownStartNode(start_name.to_string()))?;

    let cache = cache_for(cache_usage);
    let (state, _handle_rx) = RunState::new();

    let cache_for_scope = cache.clone();
    let tracker = state.tracker.clone();
    let state_for_spawn = state.clone();
    let graph_for_spawn = graph.clone();
    CURRENT_CACHE
        .scope(cache_for_scope, async move {
            spawn_execute_with_input(graph_for_spawn, start_node, tracker.clone(), cache, state_for_spawn, start_args);
            tracker.wait().await;
        })
        .await;

    if let Some(err) = state.failure.lock().take() {
        return Err(err);
    }
    Ok(state.terminal.lock().take().unwrap_or(Value::Null))
}

/// The subgraph-composition primitive: user node code may call this to
/// invoke a subgraph and await its terminal value, as an ordinary
/// awaitable. Functionally identical to [`run_graph`]; kept as a distinct
/// name so call sites read as "this node delegates to a subgraph."
pub async fn run_subgraph(
    graph: Arc<Graph>,
    start_name: &str,
    start_args: Vec<Value>,
    cache_usage: CacheUsage,
) -> Result<Value> {
    run_graph(graph, start_name, start_args, cache_usage).await
}

fn spawn_execute_with_input(
    graph: Arc<Graph>,
    node: Arc<Node>,
    tracker: Arc<BranchTracker>,
    cache: DependencyCache,
    state: Arc<RunState>,
    input: Vec<Value>,
) {
    let cache_for_scope = cache.clone();
    let handles = state.branch_handles.clone();
    let handle = tokio::spawn(CURRENT_CACHE.scope(cache_for_scope, execute_node(graph, node, tracker, cache, state, input)));
    let _ = handles.send(AbortOnDropHandle(handle));
}

/// Executes a single node occurrence: resolves its dependencies, invokes
/// it through the Async Adapter, and either records a terminal value or
/// fans out to its successors as independent tasks.
///
/// Every invocation calls exactly one of: record a terminal value and
/// retire its branch, or retire its branch while spawning successor tasks
/// (the first successor inherits the current branch; every later successor
/// adds one). A node or dependency failure retires the branch too, after
/// recording the failure for `run_graph` to surface — this keeps the
/// tracker's live-branch count consistent even on the error path.
async fn execute_node(
    graph: Arc<Graph>,
    node: Arc<Node>,
    tracker: Arc<BranchTracker>,
    cache: DependencyCache,
    state: Arc<RunState>,
    input: Vec<Value>,
) {
    let outcome = run_node(&node, &cache, input).await;

    match outcome {
        Ok(NodeOutcome::Terminal(raw)) => {
            state.record_terminal(raw);
            report_tracker_error(&state, tracker.remove_branch());
        }
        Ok(NodeOutcome::FanOut { data, successor_names }) => {
            let mut successors = Vec::with_capacity(successor_names.len());
            for name in &successor_names {
                match graph.get(name) {
                    Some(successor) => successors.push(successor),
                    None => {
                        state.record_failure(FlowError::UnknownSuccessor(name.clone()));
                        report_tracker_error(&state, tracker.remove_branch());
                        return;
                    }
                }
            }

            let input = convert_output_to_input(data);
            for successor in successors.iter().skip(1) {
                if let Err(e) = tracker.add_branch() {
                    state.record_failure(e);
                    return;
                }
                spawn_execute_with_input(graph.clone(), successor.clone(), tracker.clone(), cache.clone(), state.clone(), input.clone());
            }
            spawn_execute_with_input(graph, successors[0].clone(), tracker, cache, state, input);
        }
        Err(err) => {
            tracing::error!(node = %node.name, error = %err, "node execution failed");
            state.record_failure(err);
            report_tracker_error(&state, tracker.remove_branch());
        }
    }
}

fn report_tracker_error(state: &Arc<RunState>, result: Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "branch tracker mutated after completion (scheduler bug)");
        state.record_failure(e);
    }
}

enum NodeOutcome {
    Terminal(Value),
    FanOut { data: Value, successor_names: Vec<String> },
}

async fn run_node(node: &Arc<Node>, cache: &DependencyCache, input: Vec<Value>) -> Result<NodeOutcome> {
    let mut kwargs = std::collections::HashMap::new();
    for dep_name in &node.node_type.dependency_names {
        let value = cache.resolve(dep_name).await?;
        kwargs.insert(dep_name.clone(), value);
    }

    let raw = node.invoke(input, kwargs).await?;

    if !node.has_successors() {
        return Ok(NodeOutcome::Terminal(raw));
    }

    let data = node.extract_data(&raw);
    let successor_names = node.next(&raw);
    if successor_names.is_empty() {
        // Matcher miss: not an error, terminates the branch silently.
        tracing::warn!(node = %node.name, "matcher miss; branch terminates");
        return Ok(NodeOutcome::Terminal(raw));
    }

    Ok(NodeOutcome::FanOut { data, successor_names })
}

//! The Async Adapter: converts both blocking and non-blocking user
//! functions into awaitables, routing blocking calls to a worker pool.

use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::node_type::{Args, BlockingBehavior, Kwargs, NodeFn, NodeType};

/// Invokes `node_type`'s callable, returning a future that completes with
/// its result (or its failure — exceptions raised by user code are
/// propagated, never swallowed).
///
/// - An async callable is invoked directly.
/// - A blocking-behavior `non_blocking` callable is scheduled as a plain
///   task on the runtime: it runs to completion without yielding, but
///   without stalling the worker thread pool either.
/// - A blocking-behavior `blocking` callable is dispatched to
///   [`tokio::task::spawn_blocking`]; the adapter's future completes when
///   that worker finishes.
pub async fn ensure_awaitable(node_type: &NodeType, args: Args, kwargs: Kwargs) -> Result<Value> {
    match &node_type.callable {
        NodeFn::Async(f) => {
            tracing::trace!(node_type = %node_type.name, "invoking async node callable");
            f(args, kwargs).await
        }
        NodeFn::Blocking(f) => match node_type.blocking_behavior {
            BlockingBehavior::NonBlocking => {
                tracing::trace!(node_type = %node_type.name, "invoking non-blocking node callable inline");
                let f = f.clone();
                tokio::spawn(async move { f(args, kwargs) })
                    .await
                    .map_err(|e| FlowError::UserCodeFailure(format!("node task panicked: {e}")))?
            }
            BlockingBehavior::Blocking => {
                tracing::trace!(node_type = %node_type.name, "dispatching blocking node callable to worker pool");
                let f = f.clone();
                tokio::task::spawn_blocking(move || f(args, kwargs))
                    .await
                    .map_err(|e| FlowError::UserCodeFailure(format!("node task panicked: {e}")))?
            }
        },
    }
}

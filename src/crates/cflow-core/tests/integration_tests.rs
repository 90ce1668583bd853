//! End-to-end tests exercising only the public API: register node types and
//! dependencies, build a graph via the DSL, and run it. These complement
//! the unit tests inside each module, which reach into crate-private
//! details the public surface intentionally hides.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cflow_core::dependency::{self, CachePolicy};
use cflow_core::dsl::GraphBuilder;
use cflow_core::node_type::{self, BlockingBehavior, BranchingStrategy, NodeFn};
use cflow_core::scheduler::CacheUsage;
use cflow_core::{run_graph, FlowError};
use serde_json::Value;

// `node_type`/`dependency` are process-wide registries; tests that touch
// them must not interleave, or one test's registration bleeds into
// another's assertions.
static REGISTRY_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

fn register_echo(name: &str) {
    node_type::register(
        name,
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|args, _kwargs| Ok(args.into_iter().next().unwrap_or(Value::Null)))),
        Vec::<&str>::new(),
        "Value",
        Vec::<&str>::new(),
    )
    .unwrap();
}

#[tokio::test]
async fn dsl_built_graph_runs_end_to_end() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_b = calls.clone();
    node_type::register(
        "start",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|_args, _kwargs| Ok(Value::from("Guido")))),
        Vec::<&str>::new(),
        "String",
        Vec::<&str>::new(),
    )
    .unwrap();
    node_type::register(
        "greet",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(move |args, _kwargs| {
            calls_for_b.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(format!("Welcome {}!", args[0].as_str().unwrap_or_default())))
        })),
        Vec::<&str>::new(),
        "String",
        Vec::<&str>::new(),
    )
    .unwrap();

    let builder = GraphBuilder::new();
    let start = builder.node("start", "start");
    let greet = builder.node("greet", "greet");
    let _ = start >> greet;
    let graph = Arc::new(builder.build().unwrap());

    let result = run_graph(graph, "start", vec![], CacheUsage::Independent).await.unwrap();
    assert_eq!(result, Value::from("Welcome Guido!"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn matcher_graph_routes_by_key_end_to_end() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();

    node_type::register(
        "source",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|_args, _kwargs| Ok(Value::from("blizzard")))),
        Vec::<&str>::new(),
        "String",
        Vec::<&str>::new(),
    )
    .unwrap();
    node_type::register(
        "classify",
        BranchingStrategy::Matcher,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|args, _kwargs| {
            let severe = args[0].as_str() == Some("blizzard");
            let key = if severe { "severe" } else { "mild" };
            Ok(Value::Array(vec![Value::from(key), args[0].clone()]))
        })),
        Vec::<&str>::new(),
        "(String, Value)",
        Vec::<&str>::new(),
    )
    .unwrap();
    register_echo("alert");
    register_echo("log");

    let builder = GraphBuilder::new();
    let source = builder.node("source", "source");
    let classify = builder.node("classify", "classify");
    let alert = builder.node("alert", "alert");
    let log = builder.node("log", "log");
    let _ = source >> classify.clone();
    classify.branch("severe", alert);
    classify.branch("mild", log);

    let graph = Arc::new(builder.build().unwrap());
    let result = run_graph(graph, "source", vec![], CacheUsage::Independent).await.unwrap();
    assert_eq!(result, Value::from("blizzard"));
}

#[tokio::test]
async fn dsl_built_graph_supports_a_genuine_loop() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();

    let count = Arc::new(AtomicUsize::new(0));
    let count_for_node = count.clone();
    node_type::register(
        "counter",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(move |_args, _kwargs| {
            Ok(Value::from(count_for_node.fetch_add(1, Ordering::SeqCst) + 1))
        })),
        Vec::<&str>::new(),
        "i64",
        Vec::<&str>::new(),
    )
    .unwrap();
    node_type::register(
        "gate",
        BranchingStrategy::Matcher,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|args, _kwargs| {
            let n = args[0].as_i64().unwrap_or(0);
            let key = if n < 3 { "again" } else { "done" };
            Ok(Value::Array(vec![Value::from(key), Value::from(n)]))
        })),
        Vec::<&str>::new(),
        "(String, Value)",
        Vec::<&str>::new(),
    )
    .unwrap();
    register_echo("done");

    let builder = GraphBuilder::new();
    let counter = builder.node("counter", "counter");
    let gate = builder.node("gate", "gate");
    let done = builder.node("done", "done");
    let _ = counter.clone() >> gate.clone();
    gate.branch("again", counter);
    gate.branch("done", done);

    let graph = Arc::new(builder.build().unwrap());
    let result = run_graph(graph, "counter", vec![], CacheUsage::Independent).await.unwrap();
    assert_eq!(result, Value::from(3));
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dependency_resolved_once_across_concurrent_successors() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();
    dependency::clear_for_tests();

    let producer_calls = Arc::new(AtomicUsize::new(0));
    let producer_calls2 = producer_calls.clone();
    dependency::register_dependency(
        "api_key",
        CachePolicy::CachePermanently,
        Vec::<&str>::new(),
        Arc::new(move |_args| {
            let calls = producer_calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from("secret"))
            })
        }),
    )
    .unwrap();

    node_type::register(
        "start",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|_args, _kwargs| Ok(Value::Null))),
        Vec::<&str>::new(),
        "Value",
        Vec::<&str>::new(),
    )
    .unwrap();
    node_type::register(
        "needs_key",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|_args, kwargs| Ok(kwargs.get("api_key").cloned().unwrap()))),
        Vec::<&str>::new(),
        "Value",
        vec!["api_key"],
    )
    .unwrap();

    let builder = GraphBuilder::new();
    let start = builder.node("start", "start");
    let left = builder.node("left", "needs_key");
    let right = builder.node("right", "needs_key");
    let _ = start.clone() >> left;
    let _ = start >> right;

    let graph = Arc::new(builder.build().unwrap());
    run_graph(graph, "start", vec![], CacheUsage::Independent).await.unwrap();
    assert_eq!(producer_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_start_node_is_reported() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();

    let graph = Arc::new(cflow_core::Graph::new());
    let err = run_graph(graph, "nowhere", vec![], CacheUsage::Independent).await.unwrap_err();
    assert!(matches!(err, FlowError::UnknownStartNode(name) if name == "nowhere"));
}

#[tokio::test]
async fn node_failure_is_surfaced_without_hanging() {
    let _guard = REGISTRY_LOCK.lock();
    node_type::clear_for_tests();

    node_type::register(
        "boom",
        BranchingStrategy::Parallel,
        BlockingBehavior::Blocking,
        NodeFn::Blocking(Arc::new(|_args, _kwargs| Err(FlowError::UserCodeFailure("kaboom".into())))),
        Vec::<&str>::new(),
        "Value",
        Vec::<&str>::new(),
    )
    .unwrap();

    let builder = GraphBuilder::new();
    builder.node("boom", "boom");
    let graph = Arc::new(builder.build().unwrap());

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        run_graph(graph, "boom", vec![], CacheUsage::Independent),
    )
    .await
    .expect("run_graph must not hang when a node fails");

    assert!(matches!(result, Err(FlowError::UserCodeFailure(msg)) if msg == "kaboom"));
}

//! End-to-end controller tests: ordering, merge policy, error policy,
//! pause/resume/stop and snapshot observation, all against small in-memory
//! graphs with purpose-built test executors.

use async_trait::async_trait;
use cascadecore::{
    Edge, ExecutionStatus, ExecutorContext, Graph, Node, NodeCategory, NodeError, NodeExecutor,
    Value,
};
use cascaderuntime::{ControllerSettings, ExecutionController, ExecutorRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

/// Returns `"out-<node id>"` for whatever category it is registered under.
struct Echo(NodeCategory);

#[async_trait]
impl NodeExecutor for Echo {
    fn category(&self) -> NodeCategory {
        self.0
    }
    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        Ok(Value::from(format!("out-{}", ctx.node.id)))
    }
}

/// Always fails; `retryable` configurable.
struct Fail(NodeCategory, bool);

#[async_trait]
impl NodeExecutor for Fail {
    fn category(&self) -> NodeCategory {
        self.0
    }
    async fn execute(&self, _ctx: ExecutorContext) -> Result<Value, NodeError> {
        if self.1 {
            Err(NodeError::retryable("intentional failure"))
        } else {
            Err(NodeError::failed("intentional failure"))
        }
    }
}

/// Sleeps for the given duration, honoring cancellation.
struct Slow(NodeCategory, u64);

#[async_trait]
impl NodeExecutor for Slow {
    fn category(&self) -> NodeCategory {
        self.0
    }
    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(self.1)) => {
                Ok(Value::from(format!("out-{}", ctx.node.id)))
            }
        }
    }
}

/// Sleeps without ever checking cancellation; used to exercise the timeout
/// budget.
struct Stubborn(NodeCategory, u64);

#[async_trait]
impl NodeExecutor for Stubborn {
    fn category(&self) -> NodeCategory {
        self.0
    }
    async fn execute(&self, _ctx: ExecutorContext) -> Result<Value, NodeError> {
        sleep(Duration::from_millis(self.1)).await;
        Ok(Value::Null)
    }
}

fn linear_graph() -> Graph {
    Graph::new(
        vec![
            Node::new("a", NodeCategory::Data),
            Node::new("b", NodeCategory::Processing),
            Node::new("c", NodeCategory::Output),
        ],
        vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "c")],
    )
    .unwrap()
}

fn echo_registry() -> Arc<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Echo(NodeCategory::Data)));
    registry.register(Arc::new(Echo(NodeCategory::Processing)));
    registry.register(Arc::new(Echo(NodeCategory::Output)));
    Arc::new(registry)
}

fn inputs(pairs: &[(&str, i64)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

#[tokio::test]
async fn linear_chain_runs_to_success() {
    init_tracing();
    let controller = ExecutionController::new(linear_graph(), echo_registry());

    let summary = controller.start(inputs(&[("x", 1)])).await.unwrap();
    assert_eq!(summary.status, ExecutionStatus::Success);
    assert_eq!(summary.completed_nodes, 3);
    assert_eq!(summary.total_nodes, 3);

    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.status, ExecutionStatus::Success);
    assert!(ctx.end_time.is_some());

    // Root node received the original input bag.
    let a = ctx.node_state("a").unwrap();
    assert_eq!(a.input, Some(Value::Object(inputs(&[("x", 1)]))));

    // B's input is exactly A's stored output.
    let b = ctx.node_state("b").unwrap();
    assert_eq!(b.input, a.output);

    // Variables hold each node's output under its id.
    assert_eq!(ctx.variables.get("a"), Some(&Value::from("out-a")));
    assert_eq!(ctx.variables.get("c"), Some(&Value::from("out-c")));
}

#[tokio::test]
async fn fan_in_merges_outputs_in_edge_declaration_order() {
    init_tracing();
    let graph = Graph::new(
        vec![
            Node::new("a", NodeCategory::Data),
            Node::new("b", NodeCategory::Processing),
            Node::new("c", NodeCategory::Output),
        ],
        vec![Edge::new("e1", "a", "c"), Edge::new("e2", "b", "c")],
    )
    .unwrap();
    let controller = ExecutionController::new(graph, echo_registry());
    controller.start(HashMap::new()).await.unwrap();

    let c = controller.node_state("c").await.unwrap();
    let bag = match c.input.unwrap() {
        Value::Object(map) => map,
        other => panic!("expected object input, got {:?}", other),
    };
    assert_eq!(
        bag["inputs"],
        Value::Array(vec![Value::from("out-a"), Value::from("out-b")])
    );
}

#[tokio::test]
async fn cyclic_graph_fails_before_any_node_runs() {
    init_tracing();
    let graph = Graph::new(
        vec![
            Node::new("a", NodeCategory::Processing),
            Node::new("b", NodeCategory::Processing),
        ],
        vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "a")],
    )
    .unwrap();
    let controller = ExecutionController::new(graph, echo_registry());

    let err = controller.start(HashMap::new()).await.unwrap_err();
    assert!(matches!(err, cascadecore::EngineError::CyclicGraph { .. }));

    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.status, ExecutionStatus::Error);
    // Zero nodes left the queued state.
    assert!(ctx
        .node_states
        .values()
        .all(|s| s.status == ExecutionStatus::Queued && s.start_time.is_none()));
}

#[tokio::test]
async fn node_failure_aborts_run_by_default() {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Echo(NodeCategory::Data)));
    registry.register(Arc::new(Fail(NodeCategory::Processing, false)));
    registry.register(Arc::new(Echo(NodeCategory::Output)));
    let controller = ExecutionController::new(linear_graph(), Arc::new(registry));

    let err = controller.start(HashMap::new()).await.unwrap_err();
    assert!(matches!(
        err,
        cascadecore::EngineError::NodeExecution { ref node_id, .. } if node_id == "b"
    ));

    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.status, ExecutionStatus::Error);
    assert_eq!(ctx.node_state("a").unwrap().status, ExecutionStatus::Success);
    assert_eq!(ctx.node_state("b").unwrap().status, ExecutionStatus::Error);
    assert_eq!(ctx.node_state("c").unwrap().status, ExecutionStatus::Queued);
    assert_eq!(ctx.errors.len(), 1);
    assert_eq!(ctx.errors[0].node_id, "b");
}

#[tokio::test]
async fn continue_on_error_records_and_keeps_going() {
    init_tracing();
    let graph = Graph::new(
        vec![
            Node::new("a", NodeCategory::Data),
            Node::new("b", NodeCategory::Processing).continue_on_error(true),
            Node::new("c", NodeCategory::Output),
        ],
        vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "c")],
    )
    .unwrap();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Echo(NodeCategory::Data)));
    registry.register(Arc::new(Fail(NodeCategory::Processing, true)));
    registry.register(Arc::new(Echo(NodeCategory::Output)));
    let controller = ExecutionController::new(graph, Arc::new(registry));

    let summary = controller.start(HashMap::new()).await.unwrap();
    assert_eq!(summary.status, ExecutionStatus::Success);
    // The swallowed failure is not a completion.
    assert_eq!(summary.completed_nodes, 2);
    assert_eq!(summary.total_nodes, 3);

    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.node_state("b").unwrap().status, ExecutionStatus::Error);
    assert!(ctx.errors[0].retryable);
    // C still ran; its sole predecessor produced no output.
    let c = ctx.node_state("c").unwrap();
    assert_eq!(c.status, ExecutionStatus::Success);
    assert_eq!(c.input, Some(Value::Null));
}

#[tokio::test]
async fn stop_halts_progression_at_the_node_boundary() {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Echo(NodeCategory::Data)));
    registry.register(Arc::new(Slow(NodeCategory::Processing, 5_000)));
    registry.register(Arc::new(Echo(NodeCategory::Output)));
    let controller = Arc::new(ExecutionController::new(linear_graph(), Arc::new(registry)));

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(HashMap::new()).await });

    // Let A finish and B get in flight, then stop.
    sleep(Duration::from_millis(100)).await;
    controller.stop().await;

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, cascadecore::EngineError::Aborted));

    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.status, ExecutionStatus::Error);
    assert!(ctx.end_time.is_some());
    assert_eq!(ctx.node_state("a").unwrap().status, ExecutionStatus::Success);
    // B observed the token and failed with a cancellation error.
    assert_eq!(ctx.node_state("b").unwrap().status, ExecutionStatus::Error);
    assert_eq!(ctx.node_state("c").unwrap().status, ExecutionStatus::Queued);
}

#[tokio::test]
async fn stop_after_terminal_state_is_a_noop() {
    init_tracing();
    let controller = ExecutionController::new(linear_graph(), echo_registry());
    controller.start(HashMap::new()).await.unwrap();

    let before = controller.context().await.unwrap();
    controller.stop().await;
    let after = controller.context().await.unwrap();

    assert_eq!(before.status, ExecutionStatus::Success);
    assert_eq!(before, after);
}

#[tokio::test]
async fn pause_blocks_the_next_node_until_resume() {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Slow(NodeCategory::Data, 100)));
    registry.register(Arc::new(Echo(NodeCategory::Processing)));
    registry.register(Arc::new(Echo(NodeCategory::Output)));
    let controller = Arc::new(ExecutionController::new(linear_graph(), Arc::new(registry)));

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(HashMap::new()).await });

    // Pause while A is still in flight.
    sleep(Duration::from_millis(20)).await;
    controller.pause().await;

    // A runs to completion; B must not start while paused.
    sleep(Duration::from_millis(200)).await;
    let ctx = controller.context().await.unwrap();
    assert_eq!(ctx.status, ExecutionStatus::Paused);
    assert_eq!(ctx.node_state("a").unwrap().status, ExecutionStatus::Success);
    assert_eq!(ctx.node_state("b").unwrap().status, ExecutionStatus::Queued);

    controller.resume().await;
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.status, ExecutionStatus::Success);
    assert_eq!(summary.completed_nodes, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rapid_pause_resume_cycles_never_wedge_the_run() {
    init_tracing();
    // Hammer the pause/resume handshake from another thread while the loop
    // is parking and unparking between nodes. A resume landing between the
    // loop's status check and its await must still wake it; if that wakeup
    // were lost the run would hang here until the watchdog fires.
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Slow(NodeCategory::Data, 5)));
    registry.register(Arc::new(Slow(NodeCategory::Processing, 5)));
    registry.register(Arc::new(Slow(NodeCategory::Output, 5)));
    let controller = Arc::new(ExecutionController::new(linear_graph(), Arc::new(registry)));

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(HashMap::new()).await });

    let toggler = controller.clone();
    let toggle = tokio::spawn(async move {
        for _ in 0..200 {
            toggler.pause().await;
            toggler.resume().await;
        }
    });

    toggle.await.unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run wedged after a pause/resume cycle")
        .unwrap()
        .unwrap();
    assert_eq!(summary.status, ExecutionStatus::Success);
    assert_eq!(summary.completed_nodes, 3);
}

#[tokio::test]
async fn timeout_budget_maps_to_a_timeout_error() {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Stubborn(NodeCategory::Data, 5_000)));
    let graph = Graph::new(vec![Node::new("a", NodeCategory::Data)], vec![]).unwrap();
    let controller = ExecutionController::with_settings(
        graph,
        Arc::new(registry),
        ControllerSettings {
            node_timeout_ms: Some(20),
            ..Default::default()
        },
    );

    let err = controller.start(HashMap::new()).await.unwrap_err();
    assert!(matches!(
        err,
        cascadecore::EngineError::NodeExecution {
            source: NodeError::Timeout { .. },
            ..
        }
    ));
    let ctx = controller.context().await.unwrap();
    // Timeouts are flagged retryable for caller-level retry policies.
    assert!(ctx.errors[0].retryable);
}

#[tokio::test]
async fn unknown_category_passes_input_through() {
    init_tracing();
    let graph = Graph::new(
        vec![
            Node::new("a", NodeCategory::Data),
            Node::new("mystery", NodeCategory::Unknown),
        ],
        vec![Edge::new("e1", "a", "mystery")],
    )
    .unwrap();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Echo(NodeCategory::Data)));
    let controller = ExecutionController::new(graph, Arc::new(registry));
    controller.start(HashMap::new()).await.unwrap();

    let state = controller.node_state("mystery").await.unwrap();
    assert_eq!(state.output, Some(Value::from("out-a")));
}

#[tokio::test]
async fn context_reads_are_idempotent_between_transitions() {
    init_tracing();
    let controller = ExecutionController::new(linear_graph(), echo_registry());
    controller.start(HashMap::new()).await.unwrap();

    let first = controller.context().await.unwrap();
    let second = controller.context().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn concurrent_start_is_rejected() {
    init_tracing();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(Slow(NodeCategory::Data, 200)));
    let graph = Graph::new(vec![Node::new("a", NodeCategory::Data)], vec![]).unwrap();
    let controller = Arc::new(ExecutionController::new(graph, Arc::new(registry)));

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(HashMap::new()).await });
    sleep(Duration::from_millis(50)).await;

    let err = controller.start(HashMap::new()).await.unwrap_err();
    assert!(matches!(err, cascadecore::EngineError::RunInProgress));

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn every_transition_broadcasts_a_snapshot() {
    init_tracing();
    let controller = ExecutionController::new(linear_graph(), echo_registry());
    let mut rx = controller.subscribe();

    controller.start(HashMap::new()).await.unwrap();

    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    // start + (running, completed) per node + final completion.
    assert_eq!(snapshots.len(), 8);
    assert_eq!(snapshots.first().unwrap().status, ExecutionStatus::Running);
    assert_eq!(snapshots.last().unwrap().status, ExecutionStatus::Success);

    // Snapshots are immutable history: the first one still shows all queued.
    assert!(snapshots[0]
        .node_states
        .values()
        .all(|s| s.status == ExecutionStatus::Queued));
}

use crate::registry::ExecutorRegistry;
use crate::scheduler::execution_order;
use cascadecore::{
    EngineError, ExecutionContext, ExecutionError, ExecutionId, ExecutionStatus, ExecutorContext,
    Graph, LogLevel, NodeError, NodeId, StateBus, StateChangeCallback, Value, WorkflowId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runtime knobs for a controller instance.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Timeout budget applied to every node executor call.
    pub node_timeout_ms: Option<u64>,
    /// Capacity of the snapshot broadcast channel.
    pub snapshot_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            node_timeout_ms: None,
            snapshot_capacity: 256,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    /// Nodes that finished successfully. A node that failed under
    /// `continue_on_error` is not counted here; it shows up in the
    /// context's `errors` instead.
    pub completed_nodes: usize,
    pub total_nodes: usize,
}

/// Orchestrates one workflow run at a time: computes the execution order,
/// drives each node through its lifecycle, merges predecessor outputs into
/// node inputs, and emits a context snapshot after every transition.
///
/// The run is strictly sequential: each node is awaited before the next
/// starts, which keeps execution order deterministic and replayable.
/// `pause`/`stop` take effect at node boundaries only; an in-flight node
/// finishes (or observes the cancellation token) on its own.
///
/// `retry_count` is surfaced in node state but never driven here; callers
/// wanting automatic retries on `retryable` failures can layer that policy
/// on top of `node_state` + `start`.
pub struct ExecutionController {
    graph: Graph,
    registry: Arc<ExecutorRegistry>,
    workflow_id: WorkflowId,
    settings: ControllerSettings,
    bus: StateBus,
    context: RwLock<Option<ExecutionContext>>,
    cancellation: RwLock<CancellationToken>,
    resume: Notify,
    run_active: AtomicBool,
}

impl ExecutionController {
    pub fn new(graph: Graph, registry: Arc<ExecutorRegistry>) -> Self {
        Self::with_settings(graph, registry, ControllerSettings::default())
    }

    pub fn with_settings(
        graph: Graph,
        registry: Arc<ExecutorRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        let bus = StateBus::new(settings.snapshot_capacity);
        Self::build(graph, registry, settings, bus)
    }

    /// Construct with an observer callback invoked on every snapshot, in
    /// addition to the broadcast channel.
    pub fn with_observer(
        graph: Graph,
        registry: Arc<ExecutorRegistry>,
        settings: ControllerSettings,
        on_state_change: StateChangeCallback,
    ) -> Self {
        let bus = StateBus::with_callback(settings.snapshot_capacity, on_state_change);
        Self::build(graph, registry, settings, bus)
    }

    fn build(
        graph: Graph,
        registry: Arc<ExecutorRegistry>,
        settings: ControllerSettings,
        bus: StateBus,
    ) -> Self {
        Self {
            graph,
            registry,
            workflow_id: Uuid::new_v4(),
            settings,
            bus,
            context: RwLock::new(None),
            cancellation: RwLock::new(CancellationToken::new()),
            resume: Notify::new(),
            run_active: AtomicBool::new(false),
        }
    }

    /// Subscribe to context snapshots. One snapshot is broadcast after every
    /// state-affecting transition.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ExecutionContext>> {
        self.bus.subscribe()
    }

    /// Execute the whole graph with the given initial inputs.
    ///
    /// Fails fast with [`EngineError::CyclicGraph`] before any node runs if
    /// the graph cannot be ordered. A node failure aborts the run unless
    /// that node is marked `continue_on_error`; the triggering error is
    /// returned and the run status ends `Error`.
    pub async fn start(
        &self,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionSummary, EngineError> {
        if self.run_active.swap(true, Ordering::SeqCst) {
            return Err(EngineError::RunInProgress);
        }
        let result = self.run(inputs).await;
        self.run_active.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, inputs: HashMap<String, Value>) -> Result<ExecutionSummary, EngineError> {
        let cancel = CancellationToken::new();
        *self.cancellation.write().await = cancel.clone();

        let node_ids: Vec<NodeId> = self.graph.nodes().iter().map(|n| n.id.clone()).collect();
        let execution_id = {
            let mut guard = self.context.write().await;
            let mut ctx = ExecutionContext::new(self.workflow_id, node_ids);
            ctx.variables = inputs.clone();
            ctx.push_log(None, LogLevel::Info, "execution started");
            let id = ctx.execution_id;
            *guard = Some(ctx);
            id
        };
        tracing::info!(%execution_id, workflow_id = %self.workflow_id, "starting execution");
        self.emit_snapshot().await;

        let order = match execution_order(&self.graph) {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(%execution_id, %err, "scheduling failed");
                self.finish_with_error(format!("scheduling failed: {}", err))
                    .await;
                return Err(err);
            }
        };
        tracing::debug!(%execution_id, ?order, "computed execution order");

        let mut completed = 0usize;
        for node_id in order {
            if cancel.is_cancelled() {
                return Err(self.abort(execution_id, completed).await);
            }
            self.wait_while_paused(&cancel).await;
            if cancel.is_cancelled() {
                return Err(self.abort(execution_id, completed).await);
            }

            match self.run_node(&node_id, &inputs, &cancel).await {
                Ok(succeeded) => completed += usize::from(succeeded),
                Err(err) => {
                    if cancel.is_cancelled() {
                        return Err(self.abort(execution_id, completed).await);
                    }
                    self.finish_with_error(format!("node '{}' failed", node_id))
                        .await;
                    return Err(err);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(self.abort(execution_id, completed).await);
        }

        {
            let mut guard = self.context.write().await;
            if let Some(ctx) = guard.as_mut() {
                ctx.push_log(None, LogLevel::Info, "execution completed");
                ctx.finish(ExecutionStatus::Success);
            }
        }
        self.emit_snapshot().await;
        tracing::info!(%execution_id, completed, "execution completed");

        Ok(ExecutionSummary {
            execution_id,
            status: ExecutionStatus::Success,
            completed_nodes: completed,
            total_nodes: self.graph.nodes().len(),
        })
    }

    /// Drive one node through queued -> running -> success|error.
    ///
    /// Returns whether the node succeeded. `Err` only when the failure
    /// should abort the run; a failure on a `continue_on_error` node is
    /// recorded and swallowed as `Ok(false)`.
    async fn run_node(
        &self,
        node_id: &str,
        initial_inputs: &HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let node = self
            .graph
            .node(node_id)
            .expect("ordered node exists in graph")
            .clone();

        let (input, variables) = {
            let guard = self.context.read().await;
            let ctx = guard.as_ref().expect("run context exists");
            (
                resolve_input(&self.graph, node_id, &ctx.variables, initial_inputs),
                ctx.variables.clone(),
            )
        };

        {
            let mut guard = self.context.write().await;
            let ctx = guard.as_mut().expect("run context exists");
            if let Some(state) = ctx.node_state_mut(node_id) {
                state.begin(input.clone());
                state.log("started");
            }
            ctx.push_log(
                Some(node_id.to_string()),
                LogLevel::Info,
                format!("node '{}' started", node_id),
            );
        }
        self.emit_snapshot().await;
        tracing::debug!(node_id, category = ?node.category, "node started");

        let executor = self.registry.get(node.category);
        let exec_ctx = ExecutorContext {
            node: node.clone(),
            input,
            variables,
            cancellation: cancel.clone(),
        };

        let execution = executor.execute(exec_ctx);
        let result = match self.settings.node_timeout_ms {
            Some(ms) => match timeout(Duration::from_millis(ms), execution).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout { ms }),
            },
            None => execution.await,
        };

        match result {
            Ok(output) => {
                {
                    let mut guard = self.context.write().await;
                    let ctx = guard.as_mut().expect("run context exists");
                    if let Some(state) = ctx.node_state_mut(node_id) {
                        state.succeed(output.clone());
                        state.log("completed");
                    }
                    ctx.variables.insert(node_id.to_string(), output);
                    ctx.push_log(
                        Some(node_id.to_string()),
                        LogLevel::Info,
                        format!("node '{}' completed", node_id),
                    );
                }
                self.emit_snapshot().await;
                tracing::info!(node_id, "node completed");
                Ok(true)
            }
            Err(err) => {
                let recorded = ExecutionError::from_node_error(node_id, &err);
                {
                    let mut guard = self.context.write().await;
                    let ctx = guard.as_mut().expect("run context exists");
                    if let Some(state) = ctx.node_state_mut(node_id) {
                        state.fail(recorded.clone());
                        state.log(format!("failed: {}", err));
                    }
                    ctx.errors.push(recorded);
                    ctx.push_log(
                        Some(node_id.to_string()),
                        LogLevel::Error,
                        format!("node '{}' failed: {}", node_id, err),
                    );
                }
                self.emit_snapshot().await;
                tracing::error!(node_id, %err, "node failed");

                if node.continue_on_error {
                    Ok(false)
                } else {
                    Err(EngineError::NodeExecution {
                        node_id: node_id.to_string(),
                        source: err,
                    })
                }
            }
        }
    }

    /// Request a pause. The in-flight node, if any, runs to completion; the
    /// loop blocks before starting the next node.
    pub async fn pause(&self) {
        {
            let mut guard = self.context.write().await;
            let Some(ctx) = guard.as_mut() else { return };
            if ctx.status != ExecutionStatus::Running {
                return;
            }
            ctx.status = ExecutionStatus::Paused;
            ctx.push_log(None, LogLevel::Info, "execution paused");
        }
        self.emit_snapshot().await;
        tracing::info!("execution paused");
    }

    /// Resume a paused run from the next unexecuted node in the precomputed
    /// order. No-op unless currently paused.
    pub async fn resume(&self) {
        {
            let mut guard = self.context.write().await;
            let Some(ctx) = guard.as_mut() else { return };
            if ctx.status != ExecutionStatus::Paused {
                return;
            }
            ctx.status = ExecutionStatus::Running;
            ctx.push_log(None, LogLevel::Info, "execution resumed");
        }
        self.resume.notify_waiters();
        self.emit_snapshot().await;
        tracing::info!("execution resumed");
    }

    /// Stop the run: cancel the shared token, mark the run failed and stamp
    /// its end. Cooperative only; in-flight executors are expected to
    /// observe the token and exit promptly. No-op once the run is terminal.
    pub async fn stop(&self) {
        {
            let mut guard = self.context.write().await;
            let Some(ctx) = guard.as_mut() else { return };
            if ctx.status.is_terminal() {
                return;
            }
            ctx.push_log(None, LogLevel::Warn, "execution stopped by user");
            ctx.finish(ExecutionStatus::Error);
        }
        self.cancellation.read().await.cancel();
        // Unblock a loop parked on pause.
        self.resume.notify_waiters();
        self.emit_snapshot().await;
        tracing::warn!("execution stopped by user");
    }

    /// Cloned snapshot of the current run context, if a run has started.
    pub async fn context(&self) -> Option<ExecutionContext> {
        self.context.read().await.clone()
    }

    /// Cloned snapshot of one node's execution state.
    pub async fn node_state(&self, node_id: &str) -> Option<cascadecore::NodeExecutionState> {
        self.context
            .read()
            .await
            .as_ref()
            .and_then(|ctx| ctx.node_state(node_id).cloned())
    }

    async fn wait_while_paused(&self, cancel: &CancellationToken) {
        loop {
            let resumed = self.resume.notified();
            tokio::pin!(resumed);
            // Register the waiter before re-reading the status, so a
            // `resume()` that lands between the status check and the await
            // still wakes us instead of being lost.
            resumed.as_mut().enable();
            let paused = {
                let guard = self.context.read().await;
                matches!(
                    guard.as_ref().map(|ctx| ctx.status),
                    Some(ExecutionStatus::Paused)
                )
            };
            if !paused {
                return;
            }
            tokio::select! {
                _ = &mut resumed => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn abort(&self, execution_id: ExecutionId, completed: usize) -> EngineError {
        tracing::warn!(%execution_id, completed, "execution aborted");
        // `stop()` already stamped the terminal state and logged; emitting
        // here would duplicate the final snapshot.
        EngineError::Aborted
    }

    async fn finish_with_error(&self, message: String) {
        {
            let mut guard = self.context.write().await;
            if let Some(ctx) = guard.as_mut() {
                ctx.push_log(None, LogLevel::Error, message);
                ctx.finish(ExecutionStatus::Error);
            }
        }
        self.emit_snapshot().await;
    }

    async fn emit_snapshot(&self) {
        let snapshot = self.context.read().await.clone();
        if let Some(ctx) = snapshot {
            self.bus.emit(ctx);
        }
    }
}

/// Merge policy for a node's input:
/// - no incoming edges: the run's original input bag, as an object;
/// - one incoming edge: that predecessor's stored output, verbatim;
/// - fan-in: `{ "inputs": [..] }` in edge declaration order, skipping
///   predecessors that never produced an output.
fn resolve_input(
    graph: &Graph,
    node_id: &str,
    variables: &HashMap<String, Value>,
    initial_inputs: &HashMap<String, Value>,
) -> Value {
    let incoming = graph.incoming_edges(node_id);
    match incoming.len() {
        0 => Value::Object(initial_inputs.clone()),
        1 => variables
            .get(incoming[0].source.as_str())
            .cloned()
            .unwrap_or(Value::Null),
        _ => {
            let merged: Vec<Value> = incoming
                .iter()
                .filter_map(|edge| variables.get(edge.source.as_str()).cloned())
                .collect();
            let mut bag = HashMap::new();
            bag.insert("inputs".to_string(), Value::Array(merged));
            Value::Object(bag)
        }
    }
}

use crate::{NodeError, NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type ExecutionId = Uuid;

/// Lifecycle status, shared by nodes and whole runs.
///
/// Run-level terminal states are `Success` and `Error`. A node stopped
/// before its turn stays `Queued`; `Paused` is a run-level overlay and is
/// never applied to an individual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Idle,
    Queued,
    Running,
    Success,
    Error,
    Paused,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Error)
    }
}

/// Error captured from a failed node executor. Appended to both the node's
/// state and the run-level error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub node_id: NodeId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

impl ExecutionError {
    pub fn from_node_error(node_id: impl Into<NodeId>, err: &NodeError) -> Self {
        Self {
            node_id: node_id.into(),
            message: err.to_string(),
            timestamp: Utc::now(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Run-scoped, append-only log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub node_id: Option<NodeId>,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub data: Option<Value>,
}

/// Per-node, per-run execution record. Created `Queued` for every node in
/// the graph when a run starts, mutated only during that node's turn, and
/// kept until the run context itself is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionState {
    pub node_id: NodeId,
    pub status: ExecutionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<ExecutionError>,
    /// Tracked for observers; the engine never drives retries itself.
    /// Re-queueing on `retryable` failures is a caller-level policy.
    pub retry_count: u32,
    pub logs: Vec<String>,
}

impl NodeExecutionState {
    pub fn queued(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            status: ExecutionStatus::Queued,
            start_time: None,
            end_time: None,
            duration_ms: None,
            input: None,
            output: None,
            error: None,
            retry_count: 0,
            logs: Vec::new(),
        }
    }

    /// `Queued -> Running`: stamp the start time and record the resolved
    /// input.
    pub fn begin(&mut self, input: Value) {
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Utc::now());
        self.input = Some(input);
    }

    /// `Running -> Success`: stamp the end time and store the output.
    pub fn succeed(&mut self, output: Value) {
        self.status = ExecutionStatus::Success;
        self.stamp_end();
        self.output = Some(output);
    }

    /// `Running -> Error`: stamp the end time and capture the error.
    pub fn fail(&mut self, error: ExecutionError) {
        self.status = ExecutionStatus::Error;
        self.stamp_end();
        self.error = Some(error);
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        if let Some(start) = self.start_time {
            self.duration_ms = Some((end - start).num_milliseconds().max(0) as u64);
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }
}

/// The run aggregate: one per execution, owned by the controller. Observers
/// only ever see cloned snapshots; once status reaches a terminal value
/// nothing but `end_time` is stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Node outputs keyed by node id, plus the run's initial inputs under
    /// their original keys.
    pub variables: HashMap<String, Value>,
    pub node_states: HashMap<NodeId, NodeExecutionState>,
    pub errors: Vec<ExecutionError>,
    pub logs: Vec<ExecutionLog>,
}

impl ExecutionContext {
    pub fn new(workflow_id: WorkflowId, node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        let node_states = node_ids
            .into_iter()
            .map(|id| (id.clone(), NodeExecutionState::queued(id)))
            .collect();
        Self {
            workflow_id,
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            variables: HashMap::new(),
            node_states,
            errors: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn node_state(&self, node_id: &str) -> Option<&NodeExecutionState> {
        self.node_states.get(node_id)
    }

    pub fn node_state_mut(&mut self, node_id: &str) -> Option<&mut NodeExecutionState> {
        self.node_states.get_mut(node_id)
    }

    pub fn push_log(
        &mut self,
        node_id: Option<NodeId>,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        self.logs.push(ExecutionLog {
            node_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
            data: None,
        });
    }

    /// Move the run to a terminal status and stamp `end_time`. Calling this
    /// again once terminal is a no-op.
    pub fn finish(&mut self, status: ExecutionStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

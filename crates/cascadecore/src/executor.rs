use crate::{Node, NodeCategory, NodeError, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Context handed to a node executor for one node's turn.
#[derive(Clone)]
pub struct ExecutorContext {
    /// The node being executed, including its read-only configuration.
    pub node: Node,

    /// Merged input resolved from the node's predecessors (or the run's
    /// initial inputs for root nodes).
    pub input: Value,

    /// Snapshot of the run variables at dispatch time.
    pub variables: HashMap<String, Value>,

    /// Shared per-run cancellation token. Executors must poll it or select
    /// on it around any long-running work; the engine never force-kills a
    /// task.
    pub cancellation: CancellationToken,
}

impl ExecutorContext {
    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.node
            .config
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("missing config: {}", name)))
    }

    pub fn config_or(&self, name: &str, default: Value) -> Value {
        self.node.config.get(name).cloned().unwrap_or(default)
    }

    pub fn config_str(&self, name: &str) -> Option<&str> {
        self.node.config.get(name).and_then(|v| v.as_str())
    }
}

/// Pluggable business logic for one node category. The engine only requires
/// that `execute` respects the cancellation token and returns within the
/// caller-supplied timeout budget.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn category(&self) -> NodeCategory;

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError>;
}

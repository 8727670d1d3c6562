use thiserror::Error;

/// Run-level error taxonomy.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An edge references a nonexistent node. Raised at graph construction,
    /// before any run starts.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// The graph contains a cycle; no nodes execute.
    #[error("Cyclic graph: topological order covers {ordered} of {total} nodes")]
    CyclicGraph { ordered: usize, total: usize },

    /// A node's executor failed and the node was not marked continue-on-error.
    #[error("Node '{node_id}' failed: {source}")]
    NodeExecution {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// The run was stopped via `stop()` before reaching a natural end.
    #[error("Execution aborted by user")]
    Aborted,

    /// A run is already in progress on this controller.
    #[error("A run is already in progress")]
    RunInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors produced by individual node executors.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}")]
    InvalidInputType { field: String, expected: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String, retryable: bool },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the failure is worth re-attempting. Only explicit executor
    /// signals count; everything else defaults to false.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeError::ExecutionFailed { retryable: true, .. } | NodeError::Timeout { .. }
        )
    }
}

//! Core abstractions for the cascade workflow engine.
//!
//! This crate holds the types every other component depends on: the graph
//! model, the dynamic `Value` payload, per-node and per-run execution state,
//! the executor trait, the error taxonomy and the snapshot bus. It contains
//! no scheduling or orchestration logic.

mod bus;
mod error;
mod executor;
mod graph;
mod state;
mod value;

pub use bus::{StateBus, StateChangeCallback};
pub use error::{EngineError, NodeError};
pub use executor::{ExecutorContext, NodeExecutor};
pub use graph::{Edge, Graph, Node, NodeCategory, NodeId};
pub use state::{
    ExecutionContext, ExecutionError, ExecutionId, ExecutionLog, ExecutionStatus, LogLevel,
    NodeExecutionState, WorkflowId,
};
pub use value::Value;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

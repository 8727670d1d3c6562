//! Workflow execution runtime.
//!
//! Hosts the topological scheduler, the category -> executor registry and
//! the execution controller that drives a run from `start()` to a terminal
//! status while broadcasting context snapshots.

mod controller;
mod registry;
mod scheduler;

pub use controller::{ControllerSettings, ExecutionController, ExecutionSummary};
pub use registry::{ExecutorRegistry, PassthroughExecutor};
pub use scheduler::execution_order;

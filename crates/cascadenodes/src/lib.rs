//! Built-in node executors, one per category.
//!
//! These are the default business-logic adapters; the engine itself only
//! knows the `NodeExecutor` trait. Swap any of them out by registering a
//! different executor for the category.

mod actions;
mod data;
mod logic;
mod output;
mod processing;

pub use actions::ActionExecutor;
pub use data::DataSourceExecutor;
pub use logic::LogicExecutor;
pub use output::OutputExecutor;
pub use processing::ProcessingExecutor;

use cascaderuntime::ExecutorRegistry;
use std::sync::Arc;

/// Register the built-in executor for every category.
pub fn register_all(registry: &mut ExecutorRegistry) {
    registry.register(Arc::new(DataSourceExecutor));
    registry.register(Arc::new(ProcessingExecutor));
    registry.register(Arc::new(LogicExecutor));
    registry.register(Arc::new(ActionExecutor::new()));
    registry.register(Arc::new(OutputExecutor));
}

use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Lenient default for unregistered categories: hand the input straight
/// through. Unknown nodes are a passthrough, not an error.
pub struct PassthroughExecutor;

#[async_trait]
impl NodeExecutor for PassthroughExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Unknown
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        Ok(ctx.input)
    }
}

/// Maps node categories to their pluggable executors.
pub struct ExecutorRegistry {
    executors: HashMap<NodeCategory, Arc<dyn NodeExecutor>>,
    passthrough: Arc<dyn NodeExecutor>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            passthrough: Arc::new(PassthroughExecutor),
        }
    }

    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        let category = executor.category();
        tracing::info!(?category, "registering node executor");
        self.executors.insert(category, executor);
    }

    /// Resolve the executor for a category, falling back to passthrough.
    pub fn get(&self, category: NodeCategory) -> Arc<dyn NodeExecutor> {
        self.executors
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.passthrough.clone())
    }

    pub fn registered_categories(&self) -> Vec<NodeCategory> {
        self.executors.keys().copied().collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascadecore::Node;
    use tokio_util::sync::CancellationToken;

    fn ctx_for(category: NodeCategory, input: Value) -> ExecutorContext {
        ExecutorContext {
            node: Node::new("n1", category),
            input,
            variables: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn unregistered_category_passes_input_through() {
        let registry = ExecutorRegistry::new();
        let input = Value::from("untouched");
        let executor = registry.get(NodeCategory::Logic);
        let out = executor
            .execute(ctx_for(NodeCategory::Logic, input.clone()))
            .await
            .unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn registered_executor_wins_over_passthrough() {
        struct Fixed;

        #[async_trait]
        impl NodeExecutor for Fixed {
            fn category(&self) -> NodeCategory {
                NodeCategory::Data
            }
            async fn execute(&self, _ctx: ExecutorContext) -> Result<Value, NodeError> {
                Ok(Value::from(42i64))
            }
        }

        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(Fixed));
        let out = registry
            .get(NodeCategory::Data)
            .execute(ctx_for(NodeCategory::Data, Value::Null))
            .await
            .unwrap();
        assert_eq!(out, Value::from(42i64));
    }
}

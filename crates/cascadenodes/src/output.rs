use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;

/// Terminal sink executor: tags its input with the configured destination
/// and hands it back. Actual delivery is out of scope for the engine.
pub struct OutputExecutor;

#[async_trait]
impl NodeExecutor for OutputExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Output
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        let destination = ctx
            .config_str("destination")
            .unwrap_or("stdout")
            .to_string();

        tracing::info!(%destination, node_id = %ctx.node.id, "output delivered");

        let mut out = HashMap::new();
        out.insert("destination".to_string(), Value::from(destination));
        out.insert("delivered".to_string(), ctx.input);
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascadecore::Node;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn payload_is_tagged_with_destination() {
        let node = Node::new("out", NodeCategory::Output).with_config("destination", "warehouse");
        let ctx = ExecutorContext {
            node,
            input: Value::from("rows"),
            variables: HashMap::new(),
            cancellation: CancellationToken::new(),
        };
        let out = OutputExecutor.execute(ctx).await.unwrap();
        assert_eq!(out.get("destination"), Some(Value::from("warehouse")));
        assert_eq!(out.get("delivered"), Some(Value::from("rows")));
    }

    #[tokio::test]
    async fn destination_defaults_to_stdout() {
        let ctx = ExecutorContext {
            node: Node::new("out", NodeCategory::Output),
            input: Value::Null,
            variables: HashMap::new(),
            cancellation: CancellationToken::new(),
        };
        let out = OutputExecutor.execute(ctx).await.unwrap();
        assert_eq!(out.get("destination"), Some(Value::from("stdout")));
    }
}

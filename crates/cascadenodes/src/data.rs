use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;

/// Data-source executor. Ignores its input and emits the node's configured
/// `payload`; without one it generates a small record set so downstream
/// nodes have something to chew on. The concrete payload is an adapter
/// concern, not engine logic.
pub struct DataSourceExecutor;

#[async_trait]
impl NodeExecutor for DataSourceExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Data
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        if let Some(payload) = ctx.node.config.get("payload") {
            return Ok(payload.clone());
        }

        let count = ctx
            .config_or("count", Value::from(3i64))
            .as_f64()
            .unwrap_or(3.0) as i64;
        if count < 0 {
            return Err(NodeError::Configuration(
                "count must be non-negative".to_string(),
            ));
        }

        let records: Vec<Value> = (0..count)
            .map(|i| {
                let mut record = HashMap::new();
                record.insert("id".to_string(), Value::from(i));
                record.insert(
                    "name".to_string(),
                    Value::from(format!("record-{}", i)),
                );
                record.insert("value".to_string(), Value::from((i * 10) as f64));
                Value::Object(record)
            })
            .collect();

        Ok(Value::Array(records))
    }
}

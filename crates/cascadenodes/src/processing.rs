use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;

/// Processing executor: a pure function of input plus node config. Enriches
/// every object element (or a single object input) with the fields under the
/// `enrich` config entry and a `processed` marker. Anything else passes
/// through untouched.
pub struct ProcessingExecutor;

impl ProcessingExecutor {
    fn enrich_object(map: &HashMap<String, Value>, extra: Option<&HashMap<String, Value>>) -> Value {
        let mut enriched = map.clone();
        if let Some(extra) = extra {
            for (key, value) in extra {
                enriched.insert(key.clone(), value.clone());
            }
        }
        enriched.insert("processed".to_string(), Value::Bool(true));
        Value::Object(enriched)
    }
}

#[async_trait]
impl NodeExecutor for ProcessingExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Processing
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        let extra = ctx.node.config.get("enrich").and_then(|v| v.as_object());

        let out = match &ctx.input {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(map) => Self::enrich_object(map, extra),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Object(map) => Self::enrich_object(map, extra),
            other => other.clone(),
        };

        Ok(out)
    }
}

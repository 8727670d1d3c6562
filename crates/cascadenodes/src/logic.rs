use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;

/// Logic executor: evaluates a configured condition (`field`, `op`,
/// `value`) against the input and attaches the boolean `decision` to the
/// output. Input fields are never mutated; the decision is an added field.
///
/// Supported ops: `eq`, `ne`, `gt`, `lt`, `contains`.
pub struct LogicExecutor;

impl LogicExecutor {
    fn compare(op: &str, left: Option<&Value>, right: &Value) -> Result<bool, NodeError> {
        let decision = match op {
            "eq" => left == Some(right),
            "ne" => left != Some(right),
            "gt" => match (left.and_then(Value::as_f64), right.as_f64()) {
                (Some(l), Some(r)) => l > r,
                _ => false,
            },
            "lt" => match (left.and_then(Value::as_f64), right.as_f64()) {
                (Some(l), Some(r)) => l < r,
                _ => false,
            },
            "contains" => match (left, right) {
                (Some(Value::String(haystack)), Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(items)), needle) => items.contains(needle),
                _ => false,
            },
            other => {
                return Err(NodeError::Configuration(format!(
                    "unsupported op: {}",
                    other
                )))
            }
        };
        Ok(decision)
    }
}

#[async_trait]
impl NodeExecutor for LogicExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Logic
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        let field = ctx
            .config_str("field")
            .ok_or_else(|| NodeError::Configuration("missing config: field".to_string()))?
            .to_string();
        let op = ctx.config_or("op", Value::from("eq"));
        let op = op.as_str().unwrap_or("eq");
        let expected = ctx.require_config("value")?.clone();

        let actual = ctx.input.get(&field);
        let decision = Self::compare(op, actual.as_ref(), &expected)?;

        let mut out = match &ctx.input {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = HashMap::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        out.insert("decision".to_string(), Value::Bool(decision));
        Ok(Value::Object(out))
    }
}

use async_trait::async_trait;
use cascadecore::{ExecutorContext, NodeCategory, NodeError, NodeExecutor, Value};
use std::collections::HashMap;
use tokio::time::Duration;

/// Side-effecting action executor. `action = "http"` performs an HTTP
/// request; anything else runs a simulated notification (a short delay,
/// optionally configured to fail). All waits select on the run's
/// cancellation token so a stopped run is not held up by in-flight work.
///
/// Transport failures and 5xx responses are marked retryable; 4xx responses
/// are not.
pub struct ActionExecutor {
    client: reqwest::Client,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn run_http(&self, ctx: &ExecutorContext) -> Result<Value, NodeError> {
        let url = ctx
            .config_str("url")
            .ok_or_else(|| NodeError::Configuration("missing config: url".to_string()))?;
        let method = ctx.config_or("method", Value::from("GET"));
        let method = method.as_str().unwrap_or("GET");

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let body = serde_json::to_value(&ctx.input)
                    .map_err(|e| NodeError::failed(format!("serialization failed: {}", e)))?;
                self.client.post(url).json(&body)
            }
            other => {
                return Err(NodeError::Configuration(format!(
                    "unsupported method: {}",
                    other
                )))
            }
        };

        tracing::debug!(%url, method, "dispatching http action");

        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            result = request.send() => result.map_err(|e| NodeError::ExecutionFailed {
                message: format!("http request failed: {}", e),
                retryable: true,
            })?,
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(NodeError::ExecutionFailed {
                message: format!("http action returned {}", status),
                retryable: true,
            });
        }
        if status.is_client_error() {
            return Err(NodeError::ExecutionFailed {
                message: format!("http action returned {}", status),
                retryable: false,
            });
        }

        let mut out = HashMap::new();
        out.insert("action".to_string(), Value::from("http"));
        out.insert("status".to_string(), Value::from(status.as_u16() as i64));
        out.insert("url".to_string(), Value::from(url));
        Ok(Value::Object(out))
    }

    async fn run_simulated(&self, ctx: &ExecutorContext) -> Result<Value, NodeError> {
        let delay_ms = ctx
            .config_or("delay_ms", Value::from(10i64))
            .as_f64()
            .unwrap_or(10.0) as u64;

        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }

        if ctx
            .config_or("fail", Value::Bool(false))
            .as_bool()
            .unwrap_or(false)
        {
            let retryable = ctx
                .config_or("retryable", Value::Bool(false))
                .as_bool()
                .unwrap_or(false);
            return Err(NodeError::ExecutionFailed {
                message: "simulated action failure".to_string(),
                retryable,
            });
        }

        let mut out = HashMap::new();
        out.insert("action".to_string(), Value::from("notify"));
        out.insert("status".to_string(), Value::from("sent"));
        Ok(Value::Object(out))
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for ActionExecutor {
    fn category(&self) -> NodeCategory {
        NodeCategory::Actions
    }

    async fn execute(&self, ctx: ExecutorContext) -> Result<Value, NodeError> {
        let action = ctx.config_or("action", Value::from("notify"));
        match action.as_str() {
            Some("http") => self.run_http(&ctx).await,
            _ => self.run_simulated(&ctx).await,
        }
    }
}

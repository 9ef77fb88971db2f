use crate::errors::ToolError;
use crate::mcp::catalog::{requires_token, tool_names, unknown_tool_error, validate_tool_args};
use crate::services::logger::Logger;
use crate::utils::redact::redact_value;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value, ToolError>;
}

const MISSING_TOKEN_MESSAGE: &str =
    "Authentication token is required. Please provide a valid JWT token.";

/// Dispatches tool calls named in the manifest to their handlers.
#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_handler(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    /// Manifest tools without a registered handler.
    pub fn missing_handlers(&self) -> Vec<&'static str> {
        tool_names()
            .into_iter()
            .filter(|name| !self.handlers.contains_key(*name))
            .collect()
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(tool)
            .cloned()
            .ok_or_else(|| unknown_tool_error(tool))?;
        let args = match args {
            Value::Null => json!({}),
            other => other,
        };

        if requires_token(tool) && !has_token(&args) {
            self.logger
                .warn("Tool called without token", Some(&json!({ "tool": tool })));
            return Ok(json!({ "error": MISSING_TOKEN_MESSAGE, "status": 401 }));
        }
        validate_tool_args(tool, &args)?;

        self.logger.debug(
            "Tool call",
            Some(&json!({ "tool": tool, "args": redact_value(&args) })),
        );
        let started = Instant::now();
        let result = handler.handle(args).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => self.logger.info(
                "Tool call finished",
                Some(&json!({ "tool": tool, "duration_ms": duration_ms })),
            ),
            Err(err) => self.logger.warn(
                "Tool call failed",
                Some(&json!({
                    "tool": tool,
                    "duration_ms": duration_ms,
                    "code": err.code,
                    "error": err.message,
                })),
            ),
        }
        result
    }
}

fn has_token(args: &Value) -> bool {
    args.get("token")
        .and_then(Value::as_str)
        .map(|token| !token.trim().is_empty())
        .unwrap_or(false)
}

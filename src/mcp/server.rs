use crate::constants::service;
use crate::errors::{ToolError, ToolErrorKind};
use crate::mcp::catalog::tool_catalog;
use crate::mcp::protocol::{codes, JsonRpcRequest, JsonRpcResponse};
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolExecutor;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const PROTOCOL_VERSION: &str = "2025-06-18";

fn map_tool_error(tool: &str, error: &ToolError) -> (i32, String) {
    let mut lines = vec![
        format!("tool: {}", tool),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    let code = match error.kind {
        ToolErrorKind::InvalidParams => codes::INVALID_PARAMS,
        ToolErrorKind::NotFound => codes::METHOD_NOT_FOUND,
        _ => codes::INTERNAL_ERROR,
    };
    (code, lines.join("\n"))
}

/// Exposes the tool manifest over newline-delimited JSON-RPC.
pub struct McpServer {
    logger: Logger,
    executor: ToolExecutor,
}

impl McpServer {
    pub fn new(logger: Logger, executor: ToolExecutor) -> Self {
        Self {
            logger: logger.child("mcp"),
            executor,
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": service::NAME, "version": service::VERSION },
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": tool_catalog() })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, (i32, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| (codes::INVALID_PARAMS, "Missing tool name".to_string()))?;
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        let result = self
            .executor
            .execute(name, args)
            .await
            .map_err(|err| map_tool_error(name, &err))?;
        let is_error = result.get("error").is_some()
            || result.get("success").and_then(Value::as_bool) == Some(false);
        let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| "{}".to_string());
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }

    /// Answers one request. Notifications produce no response.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone()?;
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(&request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err((code, message)) => JsonRpcResponse::failure(id, code, message),
            },
            _ => JsonRpcResponse::failure(id, codes::METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);
        self.logger.info("MCP session started", None);

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Value>(trimmed) {
                Err(_) => Some(JsonRpcResponse::failure(
                    Value::Null,
                    codes::PARSE_ERROR,
                    "Parse error",
                )),
                Ok(parsed) => match serde_json::from_value::<JsonRpcRequest>(parsed) {
                    Ok(request) => self.dispatch(request).await,
                    Err(_) => Some(JsonRpcResponse::failure(
                        Value::Null,
                        codes::INVALID_REQUEST,
                        "Invalid request",
                    )),
                },
            };
            if let Some(response) = response {
                let payload = serde_json::to_string(&response)?;
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        self.logger.info("MCP session closed", None);
        Ok(())
    }

    pub async fn run_stdio(&self) -> std::io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

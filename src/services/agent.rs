use crate::config::AgentConfig;
use crate::constants::{agent, network};
use crate::errors::ToolError;
use crate::mcp::catalog::{accepts_token, tools_for_agent, INJECTED_TOKEN_FIELD};
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolExecutor;
use crate::stores::memory_session_store::MemorySessionStore;
use crate::utils::redact::redact_text;
use crate::utils::text::preview;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a compliance assistant for an AI governance platform. \
Use the provided tools to read and change frameworks, controls, assessments, use cases, \
tenants, documents, cloud resources and metrics. Authentication is handled for you; never \
ask the user for a token. Report upstream errors plainly and do not invent data.";

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Attachment {
    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.data))
    }

    /// The content part handed to the model, when the type is supported.
    fn content_part(&self) -> Option<Value> {
        let mime = self.content_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            return Some(json!({ "type": "image_url", "image_url": { "url": self.data_url() } }));
        }
        if mime == "application/pdf" {
            return Some(json!({
                "type": "file",
                "file": { "filename": self.filename, "file_data": self.data_url() }
            }));
        }
        if mime.starts_with("text/") || mime == "application/json" {
            let text = String::from_utf8_lossy(&self.data);
            return Some(json!({
                "type": "text",
                "text": format!("Attached file {}:\n{}", self.filename, text)
            }));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    pub query: String,
    pub token: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub message: String,
    pub session_id: String,
    pub tool_calls: usize,
    pub file_processed: bool,
}

/// The LLM side of the bridge.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(&self, request: AgentRequest) -> Result<AgentReply, ToolError>;
}

/// Tool-calling loop against an OpenAI-compatible chat completions API.
///
/// The caller's token never reaches the model: it is stripped from the
/// tool schemas and written into every tool call's arguments here.
pub struct ChatCompletionsAgent {
    logger: Logger,
    client: reqwest::Client,
    config: AgentConfig,
    executor: ToolExecutor,
    sessions: MemorySessionStore,
    tools: Vec<Value>,
}

impl ChatCompletionsAgent {
    pub fn new(
        logger: Logger,
        config: AgentConfig,
        executor: ToolExecutor,
        sessions: MemorySessionStore,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(network::AGENT_REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build model client: {}", err)))?;
        Ok(Self {
            logger: logger.child("agent"),
            client,
            config,
            executor,
            sessions,
            tools: tools_for_agent(),
        })
    }

    async fn complete(&self, messages: &[Value]) -> Result<Value, ToolError> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "tools": self.tools,
            "tool_choice": "auto",
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ToolError::timeout("Model request timed out")
                } else {
                    ToolError::unavailable(format!("Model request failed: {}", err))
                }
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ToolError::unavailable(format!("Model response unreadable: {}", err)))?;
        if !status.is_success() {
            return Err(ToolError::unavailable(format!(
                "Model API error {}: {}",
                status.as_u16(),
                preview(&text, agent::LOG_PREVIEW_CHARS)
            )));
        }
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|err| ToolError::unavailable(format!("Model response is not JSON: {}", err)))?;
        parsed
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| ToolError::unavailable("Model response has no message"))
    }

    async fn run_tool(&self, call: &Value, token: Option<&str>) -> Value {
        let name = call
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let raw_args = call
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .unwrap_or("{}");
        let args = match serde_json::from_str::<Value>(raw_args) {
            Ok(args) => inject_token(args, token.filter(|_| accepts_token(name))),
            Err(err) => return json!({ "error": format!("Invalid tool arguments: {}", err) }),
        };
        match self.executor.execute(name, args).await {
            Ok(result) => result,
            Err(err) => json!({ "error": err.message, "hint": err.hint }),
        }
    }
}

fn inject_token(args: Value, token: Option<&str>) -> Value {
    let mut args = match args {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    args.remove(INJECTED_TOKEN_FIELD);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        args.insert(INJECTED_TOKEN_FIELD.to_string(), Value::String(token.to_string()));
    }
    Value::Object(args)
}

fn user_message(query: &str, attachment: Option<&Attachment>) -> (Value, bool) {
    let Some(part) = attachment.and_then(Attachment::content_part) else {
        return (json!({ "role": "user", "content": query }), false);
    };
    let content = json!([{ "type": "text", "text": query }, part]);
    (json!({ "role": "user", "content": content }), true)
}

#[async_trait]
impl AgentRuntime for ChatCompletionsAgent {
    async fn run(&self, request: AgentRequest) -> Result<AgentReply, ToolError> {
        let conversation = self
            .sessions
            .open(&request.user_id, request.session_id.as_deref());
        let logger = self
            .logger
            .with_field("session_id", conversation.session_id.clone());
        let mut messages = conversation.history;
        if messages.is_empty() {
            messages.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
        }
        let (turn, file_processed) = user_message(&request.query, request.attachment.as_ref());
        let turn_index = messages.len();
        messages.push(turn);
        logger.info(
            "Agent turn started",
            Some(&json!({
                "user": request.user_id,
                "query": preview(&request.query, agent::LOG_PREVIEW_CHARS),
                "file": request.attachment.as_ref().map(|file| file.filename.clone()),
            })),
        );

        let token = request.token.as_deref();
        let mut tool_calls = 0;
        let mut final_text: Option<String> = None;
        for _ in 0..agent::MAX_TOOL_ROUNDS {
            let reply = self.complete(&messages).await?;
            let calls = reply
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            messages.push(reply.clone());
            if calls.is_empty() {
                final_text = reply
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                break;
            }
            for call in &calls {
                tool_calls += 1;
                let output = self.run_tool(call, token).await;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.get("id").cloned().unwrap_or(Value::Null),
                    "content": output.to_string(),
                }));
            }
        }

        let message = final_text
            .filter(|text| !text.trim().is_empty())
            .map(|text| redact_text(&text, token))
            .unwrap_or_else(|| agent::NO_RESPONSE.to_string());

        if file_processed {
            messages[turn_index] = json!({ "role": "user", "content": request.query });
        }
        self.sessions
            .save(&conversation.session_id, &request.user_id, messages);
        logger.info(
            "Agent turn finished",
            Some(&json!({
                "tool_calls": tool_calls,
                "response": preview(&message, agent::LOG_PREVIEW_CHARS),
            })),
        );
        Ok(AgentReply {
            message,
            session_id: conversation.session_id,
            tool_calls,
            file_processed,
        })
    }
}

use crate::constants::{retry, upstream};
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::transport::{
    HttpMethod, HttpTransport, OutboundRequest, RawResponse, TransportError,
};
use crate::services::validation::Validation;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_ms: retry::MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sleep before the next attempt, after `attempt` attempts have failed.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as u32;
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// The uniform result of one upstream call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    status: u16,
    success: bool,
    data: Value,
    endpoint: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    attempts: usize,
}

impl ResultEnvelope {
    pub(crate) fn from_response(
        response: RawResponse,
        endpoint: &str,
        method: HttpMethod,
        attempts: usize,
    ) -> Self {
        let status = response.status;
        let error = match status {
            401 => Some(upstream::AUTH_FAILED_MESSAGE.to_string()),
            s if s >= 400 => Some(format!("API error: {}", s)),
            _ => None,
        };
        Self {
            status,
            success: (200..300).contains(&status),
            data: parse_body(&response.body),
            endpoint: endpoint.to_string(),
            method: method.as_str().to_string(),
            error,
            attempts,
        }
    }

    pub(crate) fn local_fault(
        endpoint: &str,
        method: HttpMethod,
        message: impl Into<String>,
        attempts: usize,
    ) -> Self {
        Self {
            status: 500,
            success: false,
            data: Value::Null,
            endpoint: endpoint.to_string(),
            method: method.as_str().to_string(),
            error: Some(message.into()),
            attempts,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({
                "status": self.status,
                "success": self.success,
                "endpoint": self.endpoint,
                "method": self.method,
            })
        })
    }
}

fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "raw_response": body }))
}

/// Leading slash always; `/<id>` appended for single-resource methods.
pub fn normalize_endpoint(endpoint: &str, method: HttpMethod, resource_id: Option<&str>) -> String {
    let trimmed = endpoint.trim();
    let mut path = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    if let Some(id) = resource_id.map(str::trim).filter(|id| !id.is_empty()) {
        if method.targets_single_resource() {
            let base = path.trim_end_matches('/');
            path = format!("{}/{}", base, id);
        }
    }
    path
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub endpoint: String,
    pub method: HttpMethod,
    pub data: Option<Value>,
    pub params: Option<Map<String, Value>>,
    pub token: Option<String>,
    pub resource_id: Option<String>,
}

impl ApiCall {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            data: None,
            params: None,
            token: None,
            resource_id: None,
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

fn query_pairs(params: Option<&Map<String, Value>>) -> Vec<(String, String)> {
    params
        .into_iter()
        .flatten()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

const METHOD_NAMES: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Calls the upstream REST API on behalf of every tool.
pub struct ApiManager {
    logger: Logger,
    validation: Validation,
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    policy: RetryPolicy,
}

impl ApiManager {
    pub fn new(
        logger: Logger,
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            logger: logger.child("api"),
            validation: Validation::new(),
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    /// Never fails: transport trouble that outlives the retry budget comes
    /// back as a synthetic 500 envelope.
    pub async fn call(&self, call: ApiCall) -> ResultEnvelope {
        let endpoint = normalize_endpoint(&call.endpoint, call.method, call.resource_id.as_deref());
        let mut request = OutboundRequest::new(call.method, format!("{}{}", self.base_url, endpoint))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        if let Some(token) = call.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(upstream::TOKEN_HEADER, token);
        }
        request.query = query_pairs(call.params.as_ref());
        request.body = call.data;

        let (outcome, attempts) = self.send_with_retry(&request).await;
        let envelope = match outcome {
            Ok(response) => ResultEnvelope::from_response(response, &endpoint, call.method, attempts),
            Err(err) => {
                self.logger.error(
                    "Upstream call failed",
                    Some(&json!({
                        "endpoint": endpoint,
                        "method": call.method.as_str(),
                        "attempts": attempts,
                        "error": err.to_string(),
                    })),
                );
                ResultEnvelope::local_fault(&endpoint, call.method, err.to_string(), attempts)
            }
        };
        self.logger.debug(
            "Upstream call finished",
            Some(&json!({
                "endpoint": envelope.endpoint(),
                "method": envelope.method(),
                "status": envelope.status(),
                "attempts": envelope.attempts(),
            })),
        );
        envelope
    }

    async fn send_with_retry(
        &self,
        request: &OutboundRequest,
    ) -> (Result<RawResponse, TransportError>, usize) {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(request).await {
                Ok(response) => return (Ok(response), attempt),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    self.logger.warn(
                        "Transient upstream failure, retrying",
                        Some(&json!({
                            "attempt": attempt,
                            "delay_ms": delay.as_millis() as u64,
                            "error": err.to_string(),
                        })),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }

    fn parse_call(&self, args: &Value) -> Result<ApiCall, ToolError> {
        let endpoint = self.validation.ensure_string(
            args.get("endpoint").unwrap_or(&Value::Null),
            "endpoint",
        )?;
        let method = match args.get("method").filter(|value| !value.is_null()) {
            None => HttpMethod::Get,
            Some(raw) => self
                .validation
                .ensure_choice(raw, "method", &METHOD_NAMES)?
                .parse::<HttpMethod>()
                .map_err(ToolError::invalid_params)?,
        };
        let data = args.get("data").filter(|value| !value.is_null()).cloned();
        Ok(ApiCall {
            endpoint,
            method,
            data,
            params: self
                .validation
                .ensure_optional_object(args.get("params"), "params")?,
            token: self
                .validation
                .ensure_optional_string(args.get("token"), "token")?,
            resource_id: self
                .validation
                .ensure_optional_string(args.get("resource_id"), "resource_id")?,
        })
    }
}

#[async_trait]
impl ToolHandler for ApiManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let call = self.parse_call(&args)?;
        Ok(self.call(call).await.to_value())
    }
}

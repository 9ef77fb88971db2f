use crate::config::ConfigError;
use crate::services::http_pool::PoolError;
use crate::services::secret_store::SecretError;
use crate::services::transport::TransportError;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidParams,
    Unauthorized,
    NotFound,
    Timeout,
    Unavailable,
    Internal,
}

impl ToolErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            ToolErrorKind::InvalidParams => 400,
            ToolErrorKind::Unauthorized => 401,
            ToolErrorKind::NotFound => 404,
            ToolErrorKind::Timeout => 504,
            ToolErrorKind::Unavailable | ToolErrorKind::Internal => 500,
        }
    }
}

/// Error surfaced by tool handlers and the HTTP surface.
///
/// `retryable` tells a caller whether repeating the same request may
/// succeed; it never triggers retries inside the crate.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, ToolErrorKind::Timeout | ToolErrorKind::Unavailable),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unauthorized, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unavailable, "UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolError {}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::internal(format!("JSON error: {}", err))
    }
}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        ToolError::invalid_params(err.to_string()).with_hint("Check the process environment.")
    }
}

impl From<SecretError> for ToolError {
    fn from(err: SecretError) -> Self {
        ToolError::unavailable(err.to_string())
    }
}

impl From<PoolError> for ToolError {
    fn from(err: PoolError) -> Self {
        ToolError::unavailable(err.to_string())
    }
}

impl From<TransportError> for ToolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => ToolError::timeout(err.to_string()),
            TransportError::Invalid(_) => ToolError::invalid_params(err.to_string()),
            _ => ToolError::unavailable(err.to_string()),
        }
    }
}

use crate::constants::{auth, limits, service, upstream};
use crate::http::error::ApiError;
use crate::http::middleware::CorrelationId;
use crate::http::HttpState;
use crate::managers::api::ApiCall;
use crate::services::agent::{AgentRequest, Attachment};
use crate::services::secret_store::SecretError;
use crate::services::token_verifier::{TokenClaims, Verification};
use crate::services::transport::HttpMethod;
use crate::utils::text::preview;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap};
use axum::{Extension, Form, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

const TOKEN_REQUIRED: &str =
    "Authentication token required. Please provide a valid JWT token in the 'token' header.";

enum AuthFailure {
    Secret(SecretError),
    Invalid(String),
}

async fn authenticate(state: &HttpState, token: &str) -> Result<TokenClaims, AuthFailure> {
    let secret = state
        .credentials
        .get_secret()
        .await
        .map_err(AuthFailure::Secret)?;
    match state.verifier.verify(token, &secret) {
        Verification::Valid(claims) => Ok(claims),
        Verification::Invalid(reason) => Err(AuthFailure::Invalid(reason)),
    }
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(upstream::TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn content_type(request: &Request) -> String {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": service::NAME,
        "version": service::VERSION,
        "endpoints": {
            "execute_agent": "POST /execute-agent",
            "execute_agent_simple": "GET /execute-agent-simple",
            "verify_token": "GET /verify-token",
            "list_endpoints": "GET /list-endpoints",
            "test_api_connection": "POST /test-api-connection",
            "health": "GET /health",
        },
        "authentication": upstream::AUTHENTICATION_NOTE,
    }))
}

pub async fn health(State(state): State<HttpState>) -> Json<Value> {
    let mut body = json!({
        "status": "healthy",
        "service": service::NAME,
        "version": service::VERSION,
        "downstream_api": "connected",
    });
    if let Err(err) = state.endpoints.fetch_docs().await {
        body["downstream_api"] = json!("error");
        body["downstream_error"] = json!(err.message);
    }
    Json(body)
}

#[derive(Debug, Default, Deserialize)]
struct FilePayload {
    filename: Option<String>,
    content_type: Option<String>,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct AgentForm {
    token: Option<String>,
    query: Option<String>,
    session_id: Option<String>,
    file: Option<FilePayload>,
}

struct AgentSubmission {
    token: Option<String>,
    query: Option<String>,
    session_id: Option<String>,
    attachment: Option<Attachment>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<AgentSubmission, ApiError> {
    let mut submission = AgentSubmission {
        token: None,
        query: None,
        session_id: None,
        attachment: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("Invalid multipart body: {}", err)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|err| {
                    ApiError::bad_request(format!("Failed to read file: {}", err))
                })?;
                if !data.is_empty() {
                    submission.attachment = Some(Attachment {
                        filename,
                        content_type,
                        data,
                    });
                }
            }
            "token" | "query" | "session_id" => {
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("Invalid field {}: {}", name, err))
                })?;
                let slot = match name.as_str() {
                    "token" => &mut submission.token,
                    "query" => &mut submission.query,
                    _ => &mut submission.session_id,
                };
                *slot = Some(text);
            }
            _ => {}
        }
    }
    Ok(submission)
}

fn decode_file(file: FilePayload) -> Result<Attachment, ApiError> {
    let data = STANDARD
        .decode(file.data.trim())
        .map_err(|err| ApiError::bad_request(format!("file.data must be base64: {}", err)))?;
    Ok(Attachment {
        filename: file.filename.unwrap_or_else(|| "upload".to_string()),
        content_type: file
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        data: Bytes::from(data),
    })
}

async fn read_submission(state: &HttpState, request: Request) -> Result<AgentSubmission, ApiError> {
    let kind = content_type(&request);
    if kind.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        return read_multipart(multipart).await;
    }
    let form = if kind.starts_with("application/x-www-form-urlencoded") {
        Form::<AgentForm>::from_request(request, state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
            .0
    } else {
        Json::<AgentForm>::from_request(request, state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
            .0
    };
    Ok(AgentSubmission {
        token: form.token,
        query: form.query,
        session_id: form.session_id,
        attachment: form.file.map(decode_file).transpose()?,
    })
}

pub async fn execute_agent(
    State(state): State<HttpState>,
    Extension(correlation): Extension<CorrelationId>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let submission = read_submission(&state, request).await?;
    let token = non_blank(submission.token).ok_or_else(|| ApiError::bad_request("token is required"))?;
    let query = non_blank(submission.query).ok_or_else(|| ApiError::bad_request("query is required"))?;

    let claims = authenticate(&state, &token).await.map_err(|failure| match failure {
        AuthFailure::Secret(err) => {
            ApiError::internal(format!("Failed to retrieve JWT secret: {}", err))
        }
        AuthFailure::Invalid(reason) => ApiError::unauthorized(format!("Invalid token: {}", reason)),
    })?;
    let user = claims.subject().unwrap_or(auth::DEFAULT_USER).to_string();

    let reply = state
        .agent
        .run(AgentRequest {
            user_id: user.clone(),
            session_id: non_blank(submission.session_id),
            query,
            token: Some(token),
            attachment: submission.attachment,
        })
        .await
        .map_err(|err| {
            state.logger.child("http").with_field("correlation_id", correlation.0.clone()).error(
                "Agent execution failed",
                Some(&json!({ "error": err.message })),
            );
            ApiError::internal(format!("Agent execution error: {}", err.message))
        })?;

    Ok(Json(json!({
        "success": true,
        "message": reply.message,
        "user": user,
        "session_id": reply.session_id,
        "file_processed": reply.file_processed,
        "authenticated": true,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SimpleQuery {
    query: Option<String>,
    session_id: Option<String>,
}

/// Always answers 200; failures are reported in the body.
pub async fn execute_agent_simple(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(params): Query<SimpleQuery>,
) -> Json<Value> {
    let failure = |error: String, authenticated: bool| {
        Json(json!({ "success": false, "error": error, "authenticated": authenticated }))
    };
    let Some(query) = non_blank(params.query) else {
        return failure("query is required".to_string(), false);
    };
    let Some(token) = header_token(&headers) else {
        return failure(TOKEN_REQUIRED.to_string(), false);
    };
    let claims = match authenticate(&state, &token).await {
        Ok(claims) => claims,
        Err(AuthFailure::Secret(err)) => {
            return failure(format!("Token verification failed: {}", err), false)
        }
        Err(AuthFailure::Invalid(reason)) => {
            return failure(format!("Invalid token: {}", reason), false)
        }
    };
    let user = claims.subject().unwrap_or(auth::DEFAULT_USER).to_string();
    let outcome = state
        .agent
        .run(AgentRequest {
            user_id: user.clone(),
            session_id: non_blank(params.session_id),
            query,
            token: Some(token),
            attachment: None,
        })
        .await;
    match outcome {
        Ok(reply) => Json(json!({
            "success": true,
            "message": reply.message,
            "authenticated": true,
            "user": user,
            "session_id": reply.session_id,
        })),
        Err(err) => failure(format!("Agent execution error: {}", err.message), true),
    }
}

pub async fn verify_token(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = header_token(&headers).ok_or_else(|| ApiError::unauthorized(TOKEN_REQUIRED))?;
    let claims = authenticate(&state, &token).await.map_err(|failure| match failure {
        AuthFailure::Secret(err) => {
            ApiError::internal(format!("Failed to retrieve JWT secret: {}", err))
        }
        AuthFailure::Invalid(reason) => ApiError::unauthorized(reason),
    })?;
    Ok(Json(json!({
        "valid": true,
        "user": claims.subject(),
        "expires": claims.expires_at().map(|at| at.to_rfc3339()),
        "issued": claims.issued_at().map(|at| at.to_rfc3339()),
    })))
}

pub async fn list_endpoints(State(state): State<HttpState>) -> Result<Json<Value>, ApiError> {
    let catalog = state
        .endpoints
        .list_endpoints()
        .await
        .map_err(|err| ApiError::internal(format!("Failed to fetch endpoints: {}", err.message)))?;
    Ok(Json(json!({
        "success": true,
        "total_endpoints": catalog.total_endpoints,
        "total_operations": catalog.total_operations,
        "base_url": catalog.base_url,
        "authentication": catalog.authentication,
        "categories": catalog.categories,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ConnectionProbe {
    token: Option<String>,
    endpoint: Option<String>,
}

pub async fn test_api_connection(
    State(state): State<HttpState>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let probe = if content_type(&request).starts_with("application/x-www-form-urlencoded") {
        Form::<ConnectionProbe>::from_request(request, &state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
            .0
    } else {
        Json::<ConnectionProbe>::from_request(request, &state)
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?
            .0
    };
    let token = non_blank(probe.token).ok_or_else(|| ApiError::bad_request("token is required"))?;
    let endpoint =
        non_blank(probe.endpoint).unwrap_or_else(|| upstream::DEFAULT_PROBE_ENDPOINT.to_string());

    authenticate(&state, &token).await.map_err(|failure| match failure {
        AuthFailure::Secret(err) => {
            ApiError::internal(format!("Failed to retrieve JWT secret: {}", err))
        }
        AuthFailure::Invalid(reason) => ApiError::unauthorized(format!("Invalid token: {}", reason)),
    })?;

    let envelope = state
        .api
        .call(ApiCall::new(endpoint.clone(), HttpMethod::Get).token(token))
        .await;
    let message = if envelope.is_success() {
        "API connection successful".to_string()
    } else {
        envelope.error().unwrap_or("API call failed").to_string()
    };
    Ok(Json(json!({
        "success": true,
        "endpoint_tested": envelope.endpoint(),
        "api_call_success": envelope.is_success(),
        "status_code": envelope.status(),
        "authenticated": envelope.status() != 401,
        "message": message,
        "data_preview": preview(&envelope.data().to_string(), limits::DATA_PREVIEW_CHARS),
    })))
}

use crate::constants::service::CORRELATION_HEADER;
use crate::http::HttpState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Tags each request with a correlation id (reusing the caller's when
/// sent), logs start and finish, and echoes the id back.
pub async fn correlation(
    State(state): State<HttpState>,
    mut request: Request,
    next: Next,
) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let logger = state.logger.child("request").with_field("correlation_id", id.clone());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    logger.info(
        "Request started",
        Some(&json!({ "method": method, "path": path })),
    );
    request.extensions_mut().insert(CorrelationId(id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;
    logger.info(
        "Request finished",
        Some(&json!({
            "method": method,
            "path": path,
            "status": response.status().as_u16(),
            "duration_ms": started.elapsed().as_millis() as u64,
        })),
    );
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

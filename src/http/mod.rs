mod error;
mod middleware;
mod routes;

pub use error::ApiError;
pub use middleware::CorrelationId;

use crate::constants::{limits, service};
use crate::managers::api::ApiManager;
use crate::managers::endpoints::EndpointCatalogBuilder;
use crate::services::agent::AgentRuntime;
use crate::services::credentials::CredentialResolver;
use crate::services::logger::Logger;
use crate::services::token_verifier::TokenVerifier;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct HttpState {
    pub logger: Logger,
    pub credentials: Arc<CredentialResolver>,
    pub verifier: Arc<TokenVerifier>,
    pub api: Arc<ApiManager>,
    pub endpoints: Arc<EndpointCatalogBuilder>,
    pub agent: Arc<dyn AgentRuntime>,
}

fn routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/execute-agent", post(routes::execute_agent))
        .route("/execute-agent-simple", get(routes::execute_agent_simple))
        .route("/verify-token", get(routes::verify_token))
        .route("/list-endpoints", get(routes::list_endpoints))
        .route("/test-api-connection", post(routes::test_api_connection))
}

/// The inbound surface, mounted both at the root and under `/api/v1`.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .merge(routes())
        .nest(service::API_PREFIX, routes())
        .layer(DefaultBodyLimit::max(limits::MAX_UPLOAD_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::correlation,
        ))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then drains open connections.
pub async fn serve<F>(listener: TcpListener, state: HttpState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let logger = state.logger.child("http");
    if let Ok(addr) = listener.local_addr() {
        logger.info("HTTP server listening", Some(&json!({ "addr": addr.to_string() })));
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    logger.info("HTTP server stopped", None);
    Ok(())
}

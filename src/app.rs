use crate::config::AppConfig;
use crate::constants::{agent, service};
use crate::errors::ToolError;
use crate::http::HttpState;
use crate::managers::api::{ApiManager, RetryPolicy};
use crate::managers::endpoints::EndpointCatalogBuilder;
use crate::managers::resource::{
    EmailTool, ResourceManager, ResourceTool, RESOURCE_TOOL_BINDINGS, SEND_EMAIL_TOOL,
};
use crate::services::agent::{AgentRuntime, ChatCompletionsAgent};
use crate::services::credentials::CredentialResolver;
use crate::services::http_pool::HttpClientPool;
use crate::services::logger::Logger;
use crate::services::secret_store::{store_for, SecretStore};
use crate::services::token_verifier::TokenVerifier;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::transport::{HttpTransport, ReqwestTransport};
use crate::stores::memory_session_store::MemorySessionStore;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const CALL_API_TOOL: &str = "call_api";
const LIST_ENDPOINTS_TOOL: &str = "list_available_endpoints";

/// Registers a handler for every tool in the manifest.
pub fn build_tool_handlers(
    api: Arc<ApiManager>,
    endpoints: Arc<EndpointCatalogBuilder>,
) -> HashMap<String, Arc<dyn ToolHandler>> {
    let resources = Arc::new(ResourceManager::new(api.clone()));
    let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
    handlers.insert(CALL_API_TOOL.to_string(), api);
    handlers.insert(LIST_ENDPOINTS_TOOL.to_string(), endpoints);
    for binding in RESOURCE_TOOL_BINDINGS {
        handlers.insert(
            binding.tool.to_string(),
            Arc::new(ResourceTool::new(resources.clone(), *binding)),
        );
    }
    handlers.insert(
        SEND_EMAIL_TOOL.to_string(),
        Arc::new(EmailTool::new(resources)),
    );
    handlers
}

/// Process-wide wiring: one client pool, one secret cache, one executor.
pub struct App {
    pub logger: Logger,
    pub config: AppConfig,
    pub pool: HttpClientPool,
    pub api: Arc<ApiManager>,
    pub endpoints: Arc<EndpointCatalogBuilder>,
    pub credentials: Arc<CredentialResolver>,
    pub verifier: Arc<TokenVerifier>,
    pub tool_executor: ToolExecutor,
}

impl App {
    fn validate_tool_wiring(executor: &ToolExecutor) -> Result<(), ToolError> {
        let mut missing = executor.missing_handlers();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json must have a registered handler.")
            .with_details(json!({ "missing_tools": missing })))
    }

    /// Resolves the secret store named by the configuration and wires the app.
    pub async fn initialize(config: AppConfig) -> Result<Self, ToolError> {
        let store = store_for(&config.secret_source, &config.aws_region).await;
        Self::with_secret_store(config, store)
    }

    pub fn with_secret_store(
        config: AppConfig,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self, ToolError> {
        let logger = Logger::new(service::NAME);
        let pool = HttpClientPool::new(
            logger.clone(),
            config.upstream.connect_timeout,
            config.upstream.read_timeout,
        );
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(pool.clone()));
        let api = Arc::new(ApiManager::new(
            logger.clone(),
            transport.clone(),
            config.upstream.base_url.clone(),
            RetryPolicy::default().with_max_attempts(config.upstream.max_attempts),
        ));
        let endpoints = Arc::new(EndpointCatalogBuilder::new(
            logger.clone(),
            transport,
            config.upstream.base_url.clone(),
        ));
        let credentials = Arc::new(CredentialResolver::new(
            logger.clone(),
            store,
            config.secret_source.secret_id(),
        ));

        let handlers = build_tool_handlers(api.clone(), endpoints.clone());
        let tool_executor = ToolExecutor::new(logger.clone(), handlers);
        Self::validate_tool_wiring(&tool_executor)?;

        logger.info(
            "Application wired",
            Some(&json!({
                "upstream": config.upstream.base_url,
                "secret_source": config.secret_source.to_string(),
                "max_attempts": config.upstream.max_attempts,
            })),
        );

        Ok(Self {
            logger,
            config,
            pool,
            api,
            endpoints,
            credentials,
            verifier: Arc::new(TokenVerifier::new()),
            tool_executor,
        })
    }

    /// The chat-completions agent, which needs `OPENAI_API_KEY`.
    pub fn chat_agent(&self) -> Result<Arc<dyn AgentRuntime>, ToolError> {
        let settings = self.config.require_agent()?;
        let sessions = MemorySessionStore::new(agent::MAX_SESSIONS, agent::SESSION_TTL_MS);
        let runtime = ChatCompletionsAgent::new(
            self.logger.clone(),
            settings.clone(),
            self.tool_executor.clone(),
            sessions,
        )?;
        Ok(Arc::new(runtime))
    }

    pub fn http_state(&self, agent: Arc<dyn AgentRuntime>) -> HttpState {
        HttpState {
            logger: self.logger.clone(),
            credentials: self.credentials.clone(),
            verifier: self.verifier.clone(),
            api: self.api.clone(),
            endpoints: self.endpoints.clone(),
            agent,
        }
    }

    /// Releases the shared HTTP client once in-flight calls finish.
    pub async fn shutdown(&self) {
        if self.pool.shutdown().await {
            self.logger.info("Shutdown complete", None);
        }
    }
}

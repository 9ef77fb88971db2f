pub mod app;
pub mod config;
pub mod constants;
pub mod errors;
pub mod http;

pub mod managers {
    pub mod api;
    pub mod endpoints;
    pub mod resource;
}

pub mod mcp {
    pub mod catalog;
    pub mod protocol;
    pub mod server;
}

pub mod services {
    pub mod agent;
    pub mod credentials;
    pub mod http_pool;
    pub mod logger;
    pub mod secret_store;
    pub mod token_verifier;
    pub mod tool_executor;
    pub mod transport;
    pub mod validation;
}

pub mod stores {
    pub mod memory_session_store;
}

pub mod utils {
    pub mod redact;
    pub mod suggest;
    pub mod text;
    pub mod tool_errors;
}

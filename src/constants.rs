pub mod service {
    pub const NAME: &str = "compliance-bridge";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8000;
    pub const API_PREFIX: &str = "/api/v1";
    pub const CORRELATION_HEADER: &str = "x-correlation-id";
}

pub mod upstream {
    pub const DEFAULT_BASE_URL: &str = "https://85tb7na8f9.execute-api.us-east-1.amazonaws.com";
    pub const API_DOCS_PATH: &str = "/api-docs";
    pub const TOKEN_HEADER: &str = "token";
    pub const AUTHENTICATION_NOTE: &str = "JWT token required in 'token' header";
    pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed. Please provide a valid JWT token.";
    pub const DEFAULT_PROBE_ENDPOINT: &str = "/frameworks";
    pub const EMAIL_PATH: &str = "/send-email";
    pub const AWS_EMAIL_PATH: &str = "/aws-simple-email";
}

pub mod network {
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;
    pub const READ_TIMEOUT_MS: u64 = 30_000;
    pub const AGENT_REQUEST_TIMEOUT_MS: u64 = 120_000;
}

pub mod retry {
    pub const MAX_ATTEMPTS: usize = 3;
    pub const BASE_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 8_000;
}

pub mod auth {
    pub const DEFAULT_SECRET_SOURCE: &str = "aws-sm:JWT_SECRET";
    pub const SECRET_JSON_FIELD: &str = "JWT_SECRET";
    pub const DEFAULT_REGION: &str = "us-east-1";
    pub const DEFAULT_USER: &str = "user_1";
    pub const GUEST_USER: &str = "guest_user";
}

pub mod agent {
    pub const DEFAULT_MODEL: &str = "gpt-4o";
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
    pub const MAX_TOOL_ROUNDS: usize = 8;
    pub const NO_RESPONSE: &str = "Agent did not produce a final response.";
    pub const SESSION_PREFIX: &str = "session_";
    pub const MAX_SESSIONS: usize = 1_000;
    pub const SESSION_TTL_MS: u64 = 3_600_000;
    pub const MAX_HISTORY_MESSAGES: usize = 50;
    pub const LOG_PREVIEW_CHARS: usize = 200;
}

pub mod limits {
    pub const DATA_PREVIEW_CHARS: usize = 200;
    pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
}

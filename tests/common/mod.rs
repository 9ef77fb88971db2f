#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use compliance_bridge::config::AppConfig;
use compliance_bridge::http::{self, HttpState};
use compliance_bridge::services::secret_store::{SecretError, SecretStore};
use jsonwebtoken::{encode, EncodingKey, Header};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const SECRET: &str = "integration-signing-secret";

pub fn mint_token(secret: &str, claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token must encode")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Secret store with a fixed answer.
pub struct StaticSecretStore(pub Result<String, SecretError>);

impl StaticSecretStore {
    pub fn ok(secret: &str) -> Arc<Self> {
        Arc::new(Self(Ok(secret.to_string())))
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self(Err(SecretError::Unavailable(reason.to_string()))))
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch(&self, _secret_id: &str) -> Result<String, SecretError> {
        self.0.clone()
    }
}

pub fn config_with(upstream: &str, extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: Vec<(String, String)> = vec![
        ("UPSTREAM_BASE_URL".to_string(), upstream.to_string()),
        ("JWT_SECRET_SOURCE".to_string(), "env:BRIDGE_IT_SECRET".to_string()),
        ("UPSTREAM_CONNECT_TIMEOUT_MS".to_string(), "1000".to_string()),
        ("UPSTREAM_READ_TIMEOUT_MS".to_string(), "5000".to_string()),
    ];
    for (key, value) in extra {
        vars.push((key.to_string(), value.to_string()));
    }
    AppConfig::from_lookup(|name| {
        vars.iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    })
    .expect("test config must be valid")
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub token: Option<String>,
    pub body: Value,
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> (u16, Value) + Send + Sync>;

#[derive(Clone)]
struct StubState {
    requests: Arc<StdMutex<Vec<RecordedRequest>>>,
    respond: Responder,
}

async fn record(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        token: headers
            .get("token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    let (status, reply) = (state.respond)(&recorded);
    state.requests.lock().unwrap().push(recorded);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(reply),
    )
}

/// In-process HTTP server that records every request and answers through a
/// caller-supplied function.
pub struct StubServer {
    pub addr: SocketAddr,
    requests: Arc<StdMutex<Vec<RecordedRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubServer {
    pub async fn spawn<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, Value) + Send + Sync + 'static,
    {
        let requests = Arc::new(StdMutex::new(Vec::new()));
        let state = StubState {
            requests: requests.clone(),
            respond: Arc::new(respond),
        };
        let app = Router::new().fallback(record).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });
        Self {
            addr,
            requests,
            shutdown: Some(tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A base URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{}", addr)
}

/// The bridge's own HTTP surface on an ephemeral port.
pub struct BridgeServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl BridgeServer {
    pub async fn spawn(state: HttpState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind bridge");
        let addr = listener.local_addr().expect("bridge addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = http::serve(listener, state, async move {
                let _ = rx.await;
            })
            .await;
        });
        Self {
            base_url: format!("http://{}", addr),
            shutdown: Some(tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

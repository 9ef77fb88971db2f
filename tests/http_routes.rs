mod common;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{mint_token, now, BridgeServer, StaticSecretStore, StubServer, SECRET, config_with};
use compliance_bridge::app::App;
use compliance_bridge::errors::ToolError;
use compliance_bridge::services::agent::{AgentReply, AgentRequest, AgentRuntime};
use compliance_bridge::services::secret_store::SecretStore;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Agent double that echoes the query and remembers what it was given.
#[derive(Default)]
struct EchoAgent {
    seen: Mutex<Vec<AgentRequest>>,
    fail: bool,
}

#[async_trait]
impl AgentRuntime for EchoAgent {
    async fn run(&self, request: AgentRequest) -> Result<AgentReply, ToolError> {
        self.seen.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ToolError::unavailable("model offline"));
        }
        Ok(AgentReply {
            message: format!("echo: {}", request.query),
            session_id: request
                .session_id
                .clone()
                .unwrap_or_else(|| "session_test".to_string()),
            tool_calls: 0,
            file_processed: request.attachment.is_some(),
        })
    }
}

struct Harness {
    bridge: BridgeServer,
    upstream: StubServer,
    agent: Arc<EchoAgent>,
    client: reqwest::Client,
}

async fn harness_with(store: Arc<dyn SecretStore>, agent: EchoAgent) -> Harness {
    let upstream = StubServer::spawn(|request| match request.path.as_str() {
        "/api-docs" => (
            200,
            json!({
                "paths": {
                    "/frameworks": {
                        "get": {"tags": ["Frameworks"], "summary": "List frameworks"},
                        "post": {"tags": ["Frameworks"], "requestBody": {"content": {}}}
                    },
                    "/ping": {"get": {"summary": "Ping"}}
                }
            }),
        ),
        "/frameworks" => (200, json!({"items": [{"id": "fw-1"}]})),
        _ => (404, json!({"message": "not found"})),
    })
    .await;
    let app = App::with_secret_store(config_with(&upstream.base_url(), &[]), store)
        .expect("app must wire");
    let agent = Arc::new(agent);
    let bridge = BridgeServer::spawn(app.http_state(agent.clone())).await;
    Harness {
        bridge,
        upstream,
        agent,
        client: reqwest::Client::new(),
    }
}

async fn harness() -> Harness {
    harness_with(StaticSecretStore::ok(SECRET), EchoAgent::default()).await
}

fn valid_token(sub: &str) -> String {
    mint_token(
        SECRET,
        json!({"sub": sub, "iat": now(), "exp": now() + 3600}),
    )
}

async fn body(response: reqwest::Response) -> Value {
    response.json().await.expect("json body")
}

#[tokio::test]
async fn verify_token_reports_claims() {
    let h = harness().await;
    let response = h
        .client
        .get(h.bridge.url("/verify-token"))
        .header("token", valid_token("alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["valid"], true);
    assert_eq!(out["user"], "alice");
    assert!(out["expires"].is_string());
    assert!(out["issued"].is_string());
}

#[tokio::test]
async fn verify_token_without_subject_reports_null_user_under_prefix() {
    let h = harness().await;
    let token = mint_token(SECRET, json!({"exp": now() + 60}));
    let response = h
        .client
        .get(h.bridge.url("/api/v1/verify-token"))
        .header("token", token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["user"], Value::Null);
    assert_eq!(out["issued"], Value::Null);
}

#[tokio::test]
async fn verify_token_rejects_expired_and_missing_tokens() {
    let h = harness().await;
    let expired = mint_token(SECRET, json!({"sub": "alice", "exp": now() - 30}));
    let response = h
        .client
        .get(h.bridge.url("/verify-token"))
        .header("token", expired)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let detail = body(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Token verification failed"), "{}", detail);

    let response = h.client.get(h.bridge.url("/verify-token")).send().await.unwrap();
    assert_eq!(response.status(), 401);
    assert!(body(response).await["detail"]
        .as_str()
        .unwrap()
        .contains("'token' header"));
}

#[tokio::test]
async fn verify_token_rejects_tokens_not_yet_valid() {
    let h = harness().await;
    let early = mint_token(
        SECRET,
        json!({"sub": "alice", "nbf": now() + 3600, "exp": now() + 7200}),
    );
    let response = h
        .client
        .get(h.bridge.url("/verify-token"))
        .header("token", early)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let detail = body(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Token verification failed"), "{}", detail);
}

#[tokio::test]
async fn execute_agent_subject_defaults_to_user_1() {
    let h = harness().await;
    let token = mint_token(SECRET, json!({"exp": now() + 60}));
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": token, "query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body(response).await["user"], "user_1");
    assert_eq!(h.agent.seen.lock().unwrap()[0].user_id, "user_1");
}

#[tokio::test]
async fn execute_agent_runs_with_verified_caller() {
    let h = harness().await;
    let token = valid_token("alice");
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": token, "query": "list my frameworks"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["success"], true);
    assert_eq!(out["message"], "echo: list my frameworks");
    assert_eq!(out["user"], "alice");
    assert_eq!(out["session_id"], "session_test");
    assert_eq!(out["file_processed"], false);
    assert_eq!(out["authenticated"], true);

    let seen = h.agent.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].user_id, "alice");
    assert_eq!(seen[0].token.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn execute_agent_accepts_forms_and_base64_files() {
    let h = harness().await;
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .form(&[
            ("token", valid_token("bob").as_str()),
            ("query", "hello"),
            ("session_id", "session_abc"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["session_id"], "session_abc");
    assert_eq!(out["user"], "bob");

    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({
            "token": valid_token("bob"),
            "query": "review this",
            "file": {
                "filename": "policy.txt",
                "content_type": "text/plain",
                "data": STANDARD.encode("all models are inventoried")
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body(response).await["file_processed"], true);
    let seen = h.agent.seen.lock().unwrap().clone();
    let attachment = seen[1].attachment.as_ref().expect("attachment forwarded");
    assert_eq!(attachment.filename, "policy.txt");
    assert_eq!(&attachment.data[..], b"all models are inventoried");
}

#[tokio::test]
async fn execute_agent_error_statuses() {
    let h = harness().await;
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": valid_token("alice")}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(body(response).await["detail"], "query is required");

    let forged = mint_token("some-other-secret", json!({"sub": "mallory", "exp": now() + 60}));
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": forged, "query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let detail = body(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Invalid token: "), "{}", detail);
    assert!(h.agent.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn execute_agent_reports_secret_and_agent_failures() {
    let h = harness_with(StaticSecretStore::failing("throttled"), EchoAgent::default()).await;
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": valid_token("alice"), "query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let detail = body(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Failed to retrieve JWT secret"), "{}", detail);

    let failing = EchoAgent {
        fail: true,
        ..EchoAgent::default()
    };
    let h = harness_with(StaticSecretStore::ok(SECRET), failing).await;
    let response = h
        .client
        .post(h.bridge.url("/execute-agent"))
        .json(&json!({"token": valid_token("alice"), "query": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(
        body(response).await["detail"],
        "Agent execution error: model offline"
    );
}

#[tokio::test]
async fn execute_agent_simple_always_answers_ok() {
    let h = harness().await;
    let response = h
        .client
        .get(h.bridge.url("/execute-agent-simple"))
        .query(&[("query", "hi")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["success"], false);
    assert_eq!(out["authenticated"], false);

    let response = h
        .client
        .get(h.bridge.url("/execute-agent-simple"))
        .query(&[("query", "hi")])
        .header("token", valid_token("carol"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["success"], true);
    assert_eq!(out["message"], "echo: hi");
    assert_eq!(out["user"], "carol");
}

#[tokio::test]
async fn list_endpoints_groups_upstream_docs() {
    let h = harness().await;
    let response = h.client.get(h.bridge.url("/list-endpoints")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["success"], true);
    assert_eq!(out["total_endpoints"], 2);
    assert_eq!(out["total_operations"], 3);
    assert_eq!(out["categories"]["Frameworks"][0]["path"], "/frameworks");
    assert_eq!(out["categories"]["general"][0]["path"], "/ping");
    assert_eq!(out["base_url"], h.upstream.base_url());
}

#[tokio::test]
async fn test_api_connection_probes_default_endpoint() {
    let h = harness().await;
    let token = valid_token("alice");
    let response = h
        .client
        .post(h.bridge.url("/test-api-connection"))
        .json(&json!({"token": token}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let out = body(response).await;
    assert_eq!(out["endpoint_tested"], "/frameworks");
    assert_eq!(out["api_call_success"], true);
    assert_eq!(out["status_code"], 200);
    assert_eq!(out["authenticated"], true);
    assert!(out["data_preview"].as_str().unwrap().contains("fw-1"));

    let probe = h
        .upstream
        .requests()
        .into_iter()
        .find(|request| request.path == "/frameworks")
        .expect("upstream probed");
    assert_eq!(probe.token.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn health_and_correlation_header() {
    let h = harness().await;
    let response = h
        .client
        .get(h.bridge.url("/health"))
        .header("x-correlation-id", "trace-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap(),
        "trace-123"
    );
    let out = body(response).await;
    assert_eq!(out["status"], "healthy");
    assert_eq!(out["downstream_api"], "connected");

    let response = h.client.get(h.bridge.url("/")).send().await.unwrap();
    assert!(response.headers().contains_key("x-correlation-id"));
    assert_eq!(body(response).await["service"], "compliance-bridge");
}

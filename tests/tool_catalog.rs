mod common;

use common::{closed_port_url, config_with, StaticSecretStore, ENV_LOCK, SECRET};
use compliance_bridge::app::App;
use compliance_bridge::errors::ToolErrorKind;
use compliance_bridge::mcp::catalog::{tool_catalog, tools_for_agent, validate_tool_args};
use compliance_bridge::services::credentials::CredentialResolver;
use compliance_bridge::services::logger::Logger;
use compliance_bridge::services::secret_store::EnvSecretStore;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

#[tokio::test]
async fn every_manifest_tool_has_a_handler() {
    let app = App::with_secret_store(
        config_with(&closed_port_url().await, &[]),
        StaticSecretStore::ok(SECRET),
    )
    .expect("app must wire");
    for tool in tool_catalog() {
        assert!(
            app.tool_executor.has_handler(&tool.name),
            "{} has no handler",
            tool.name
        );
    }
    let names: HashSet<&str> = tool_catalog().iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names.len(), tool_catalog().len(), "duplicate tool names");
}

#[test]
fn agent_tools_never_expose_the_token_field() {
    let tools = tools_for_agent();
    assert_eq!(tools.len(), tool_catalog().len());
    for tool in &tools {
        let parameters = &tool["function"]["parameters"];
        assert!(parameters["properties"].get("token").is_none());
        let required = parameters["required"].as_array().cloned().unwrap_or_default();
        assert!(!required.iter().any(|field| field == "token"));
    }
}

#[test]
fn schema_violations_name_the_field() {
    let err = validate_tool_args(
        "manage_documents",
        &json!({"operation": "list", "document_type": "slides", "token": "t"}),
    )
    .unwrap_err();
    assert!(err.message.contains("document_type: expected one of documents, policyDocuments"), "{}", err.message);

    let err = validate_tool_args(
        "manage_frameworks",
        &json!({"operation": "list", "token": "t", "framework": "fw-1"}),
    )
    .unwrap_err();
    assert_eq!(err.kind, ToolErrorKind::InvalidParams);
    assert!(err.message.starts_with("Invalid arguments for manage_frameworks"));
    assert!(err.message.contains("framework_id"), "{}", err.message);

    let err = validate_tool_args("manage_frameworks", &json!({"operation": "archive", "token": "t"}))
        .unwrap_err();
    assert!(err.message.contains("operation"), "{}", err.message);
}

#[tokio::test]
async fn env_secret_source_reads_process_environment() {
    let _guard = ENV_LOCK.lock().await;
    let previous = std::env::var("BRIDGE_IT_SECRET").ok();
    std::env::set_var("BRIDGE_IT_SECRET", r#"{"JWT_SECRET": "from-env"}"#);

    let resolver = CredentialResolver::new(
        Logger::new("test"),
        Arc::new(EnvSecretStore),
        "BRIDGE_IT_SECRET",
    );
    let secret = resolver.get_secret().await.expect("secret resolves");
    assert_eq!(secret.expose(), "from-env");

    std::env::remove_var("BRIDGE_IT_SECRET");
    let again = resolver.get_secret().await.expect("cached after first success");
    assert_eq!(again.expose(), "from-env");
    assert_eq!(resolver.fetch_count(), 1);

    restore_env("BRIDGE_IT_SECRET", previous);
}

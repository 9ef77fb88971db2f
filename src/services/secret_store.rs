use crate::config::SecretSource;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("secret '{0}' not found")]
    Missing(String),
}

/// A backend able to return the raw value stored under a secret id.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError>;
}

pub struct AwsSecretsManagerStore {
    client: Client,
}

impl AwsSecretsManagerStore {
    pub async fn new(region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&shared),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|err| SecretError::Unavailable(DisplayErrorContext(&err).to_string()))?;
        if let Some(text) = output.secret_string() {
            return Ok(text.to_string());
        }
        if let Some(blob) = output.secret_binary() {
            return String::from_utf8(blob.as_ref().to_vec()).map_err(|_| {
                SecretError::Unavailable(format!("secret '{}' is not valid UTF-8", secret_id))
            });
        }
        Err(SecretError::Missing(secret_id.to_string()))
    }
}

/// Reads secrets from process environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self, secret_id: &str) -> Result<String, SecretError> {
        std::env::var(secret_id)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SecretError::Missing(secret_id.to_string()))
    }
}

pub async fn store_for(source: &SecretSource, region: &str) -> Arc<dyn SecretStore> {
    match source {
        SecretSource::AwsSecretsManager { .. } => Arc::new(AwsSecretsManagerStore::new(region).await),
        SecretSource::Env { .. } => Arc::new(EnvSecretStore),
    }
}

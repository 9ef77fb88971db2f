use crate::constants::{agent, auth, network, retry, service, upstream};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where the JWT signing key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    AwsSecretsManager { secret_id: String },
    Env { var: String },
}

impl SecretSource {
    pub fn secret_id(&self) -> &str {
        match self {
            SecretSource::AwsSecretsManager { secret_id } => secret_id,
            SecretSource::Env { var } => var,
        }
    }
}

impl FromStr for SecretSource {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| "expected '<scheme>:<id>'".to_string())?;
        let rest = rest.trim();
        if rest.is_empty() {
            return Err("secret id must not be empty".to_string());
        }
        match scheme.trim().to_ascii_lowercase().as_str() {
            "aws-sm" | "aws" => Ok(SecretSource::AwsSecretsManager {
                secret_id: rest.to_string(),
            }),
            "env" => Ok(SecretSource::Env {
                var: rest.to_string(),
            }),
            other => Err(format!("unsupported scheme '{}' (use aws-sm or env)", other)),
        }
    }
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::AwsSecretsManager { secret_id } => write!(f, "aws-sm:{}", secret_id),
            SecretSource::Env { var } => write!(f, "env:{}", var),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_attempts: usize,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub secret_source: SecretSource,
    pub aws_region: String,
    pub host: String,
    pub port: u16,
    pub agent: Option<AgentConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let base_url = read("UPSTREAM_BASE_URL")
            .unwrap_or_else(|| upstream::DEFAULT_BASE_URL.to_string());
        let parsed = url::Url::parse(&base_url).map_err(|err| ConfigError::Invalid {
            name: "UPSTREAM_BASE_URL",
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "UPSTREAM_BASE_URL",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let connect_ms = parse_number(
            "UPSTREAM_CONNECT_TIMEOUT_MS",
            read("UPSTREAM_CONNECT_TIMEOUT_MS"),
            network::CONNECT_TIMEOUT_MS,
        )?;
        let read_ms = parse_number(
            "UPSTREAM_READ_TIMEOUT_MS",
            read("UPSTREAM_READ_TIMEOUT_MS"),
            network::READ_TIMEOUT_MS,
        )?;
        let max_attempts = parse_number(
            "UPSTREAM_MAX_ATTEMPTS",
            read("UPSTREAM_MAX_ATTEMPTS"),
            retry::MAX_ATTEMPTS as u64,
        )? as usize;
        let port = parse_number("API_PORT", read("API_PORT"), service::DEFAULT_PORT as u64)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "API_PORT",
            reason: format!("{} is out of range", port),
        })?;

        let secret_source = read("JWT_SECRET_SOURCE")
            .unwrap_or_else(|| auth::DEFAULT_SECRET_SOURCE.to_string())
            .parse::<SecretSource>()
            .map_err(|reason| ConfigError::Invalid {
                name: "JWT_SECRET_SOURCE",
                reason,
            })?;

        let agent = read("OPENAI_API_KEY").map(|api_key| AgentConfig {
            api_key,
            model: read("AGENT_MODEL").unwrap_or_else(|| agent::DEFAULT_MODEL.to_string()),
            api_base: read("AGENT_API_BASE")
                .unwrap_or_else(|| agent::DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        });

        Ok(Self {
            upstream: UpstreamConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                connect_timeout: Duration::from_millis(connect_ms),
                read_timeout: Duration::from_millis(read_ms),
                max_attempts,
            },
            secret_source,
            aws_region: read("AWS_REGION").unwrap_or_else(|| auth::DEFAULT_REGION.to_string()),
            host: read("API_HOST").unwrap_or_else(|| service::DEFAULT_HOST.to_string()),
            port,
            agent,
        })
    }

    /// The agent settings, which only the HTTP surface needs.
    pub fn require_agent(&self) -> Result<&AgentConfig, ConfigError> {
        self.agent.as_ref().ok_or(ConfigError::Missing {
            name: "OPENAI_API_KEY",
        })
    }
}

fn parse_number(name: &'static str, raw: Option<String>, fallback: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(fallback);
    };
    let value = raw.parse::<u64>().map_err(|err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

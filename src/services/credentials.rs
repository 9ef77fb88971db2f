use crate::constants::auth::SECRET_JSON_FIELD;
use crate::services::logger::Logger;
use crate::services::secret_store::{SecretError, SecretStore};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// The JWT signing key plus the moment it was fetched.
#[derive(Clone)]
pub struct Credential {
    value: Arc<str>,
    fetched_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"[REDACTED]")
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Resolves the signing key once per process.
///
/// Concurrent callers on a cold cache share a single store fetch. A failed
/// fetch leaves the cache empty so the next caller tries again.
pub struct CredentialResolver {
    logger: Logger,
    store: Arc<dyn SecretStore>,
    secret_id: String,
    cached: OnceCell<Credential>,
    fetches: AtomicUsize,
}

impl CredentialResolver {
    pub fn new(logger: Logger, store: Arc<dyn SecretStore>, secret_id: impl Into<String>) -> Self {
        Self {
            logger: logger.child("credentials"),
            store,
            secret_id: secret_id.into(),
            cached: OnceCell::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn get_secret(&self) -> Result<Credential, SecretError> {
        let credential = self
            .cached
            .get_or_try_init(|| async {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                let raw = self.store.fetch(&self.secret_id).await.map_err(|err| {
                    self.logger.error(
                        "Secret fetch failed",
                        Some(&json!({ "secret_id": self.secret_id, "error": err.to_string() })),
                    );
                    err
                })?;
                let value = unwrap_secret(&raw);
                if value.is_empty() {
                    return Err(SecretError::Missing(self.secret_id.clone()));
                }
                self.logger.info(
                    "Signing secret resolved",
                    Some(&json!({ "secret_id": self.secret_id })),
                );
                Ok::<_, SecretError>(Credential::new(value))
            })
            .await?;
        Ok(credential.clone())
    }

    pub fn is_cached(&self) -> bool {
        self.cached.initialized()
    }

    /// Number of store round-trips performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Secrets may be stored as a JSON object carrying the key under
/// `JWT_SECRET`; anything else is used verbatim.
fn unwrap_secret(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get(SECRET_JSON_FIELD) {
            Some(Value::String(inner)) => inner.clone(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

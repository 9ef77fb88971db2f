use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const REDACTED: &str = "[REDACTED]";

static SENSITIVE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "token",
        "secret",
        "password",
        "api_key",
        "apikey",
        "authorization",
        "jwt",
        "jwt_secret",
        "access_token",
        "refresh_token",
        "client_secret",
    ]
    .into_iter()
    .collect()
});

static BEARER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{5,}")
        .expect("jwt redaction regex")
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEYS.contains(normalized.as_str())
}

/// Copy of `value` with every sensitive key's value replaced, recursively.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let redacted = if is_sensitive_key(key) && !inner.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(inner)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

/// Scrubs a known secret and anything shaped like a JWT out of free text.
pub fn redact_text(text: &str, secret: Option<&str>) -> String {
    let scrubbed = match secret.filter(|s| !s.is_empty()) {
        Some(secret) => text.replace(secret, REDACTED),
        None => text.to_string(),
    };
    BEARER_PATTERN.replace_all(&scrubbed, REDACTED).into_owned()
}

use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(LogLevel::Info)
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "trace" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

/// Line-oriented stderr logger.
///
/// Each event is written as `[timestamp] LEVEL [context] message {meta}`.
/// Fields bound with [`Logger::with_field`] are merged into every event's
/// meta object, which is how request correlation ids travel.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    fields: Arc<Map<String, Value>>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            level: LogLevel::from_env(),
            fields: Arc::new(Map::new()),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}:{}", self.context, suffix)
        };
        Self {
            context,
            level: self.level,
            fields: self.fields.clone(),
        }
    }

    pub fn with_field(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut fields = (*self.fields).clone();
        fields.insert(key.to_string(), value.into());
        Self {
            context: self.context.clone(),
            level: self.level,
            fields: Arc::new(fields),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    fn render_meta(&self, meta: Option<&Value>) -> Option<Value> {
        let meta = meta.filter(|value| !value.is_null());
        if self.fields.is_empty() {
            return meta.cloned();
        }
        let mut merged = (*self.fields).clone();
        match meta {
            Some(Value::Object(extra)) => {
                for (key, value) in extra {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(other) => {
                merged.insert("meta".to_string(), other.clone());
            }
            None => {}
        }
        Some(Value::Object(merged))
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if !self.enabled(level) {
            return;
        }
        let suffix = self
            .render_meta(meta)
            .map(|value| format!(" {}", value))
            .unwrap_or_default();
        eprintln!(
            "[{}] {} [{}] {}{}",
            chrono::Utc::now().to_rfc3339(),
            level.label(),
            self.context,
            message,
            suffix
        );
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Debug, message, meta);
    }
}

use crate::errors::ToolError;
use crate::utils::tool_errors::unknown_choice_error;
use serde_json::{Map, Value};

#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(&self, value: &Value, label: &str) -> Result<String, ToolError> {
        let text = value
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ToolError::invalid_params(format!("{} must be a non-empty string", label))
            })?;
        Ok(text.to_string())
    }

    /// Absent, null and blank strings all read as `None`.
    pub fn ensure_optional_string(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(other) => self.ensure_string(other, label).map(Some),
        }
    }

    pub fn ensure_optional_object(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<Map<String, Value>>, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(ToolError::invalid_params(format!(
                "{} must be an object",
                label
            ))),
        }
    }

    pub fn ensure_optional_bool(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<bool>, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(ToolError::invalid_params(format!(
                "{} must be a boolean",
                label
            ))),
        }
    }

    pub fn ensure_choice<'a>(
        &self,
        value: &Value,
        label: &str,
        choices: &[&'a str],
    ) -> Result<&'a str, ToolError> {
        let raw = self.ensure_string(value, label)?;
        choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(&raw))
            .copied()
            .ok_or_else(|| unknown_choice_error(label, &raw, choices))
    }
}

use crate::errors::ToolError;
use crate::utils::suggest::suggest;
use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON")
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .filter_map(|tool| {
            JSONSchema::compile(&tool.input_schema)
                .ok()
                .map(|schema| (tool.name.clone(), schema))
        })
        .collect()
});

/// Argument the HTTP surface fills in on behalf of the agent.
pub const INJECTED_TOKEN_FIELD: &str = "token";

pub fn tool_catalog() -> &'static [ToolDef] {
    &TOOL_CATALOG
}

pub fn tool_names() -> Vec<&'static str> {
    TOOL_CATALOG.iter().map(|tool| tool.name.as_str()).collect()
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_CATALOG.iter().find(|tool| tool.name == name)
}

/// Whether the tool's schema lists `token` as required.
pub fn requires_token(name: &str) -> bool {
    tool_by_name(name)
        .and_then(|tool| tool.input_schema.get("required"))
        .and_then(Value::as_array)
        .map(|required| required.iter().any(|field| field == INJECTED_TOKEN_FIELD))
        .unwrap_or(false)
}

/// Whether the tool's schema has a `token` property at all.
pub fn accepts_token(name: &str) -> bool {
    tool_by_name(name)
        .and_then(|tool| tool.input_schema.pointer("/properties/token"))
        .is_some()
}

pub fn unknown_tool_error(name: &str) -> ToolError {
    let names = tool_names();
    let suggestions = suggest(name, &names, 3);
    let mut err = ToolError::not_found(format!("Unknown tool: {}", name));
    if !suggestions.is_empty() {
        err = err.with_hint(format!("Did you mean: {}?", suggestions.join(", ")));
    }
    err.with_details(json!({ "known_tools": names, "did_you_mean": suggestions }))
}

pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), ToolError> {
    let tool = tool_by_name(tool_name).ok_or_else(|| unknown_tool_error(tool_name))?;
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Err(ToolError::internal(format!(
            "Schema for {} failed to compile",
            tool_name
        )));
    };
    let problems: Vec<String> = match schema.validate(args) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .take(10)
            .map(|err| describe_violation(&err, args, &tool.input_schema))
            .collect(),
    };
    let mut message = format!("Invalid arguments for {}", tool_name);
    for problem in &problems {
        message.push_str("\n- ");
        message.push_str(problem);
    }
    Err(ToolError::invalid_params(message).with_details(json!({ "errors": problems })))
}

fn describe_violation(
    err: &jsonschema::ValidationError<'_>,
    args: &Value,
    schema: &Value,
) -> String {
    let path = err.instance_path.to_string();
    let location = if path.is_empty() { "(root)".to_string() } else { path.clone() };
    match &err.kind {
        ValidationErrorKind::Required { property } => {
            let field = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
            format!("{}: missing required field '{}'", location, field)
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let known: Vec<String> = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| props.keys().cloned().collect())
                .unwrap_or_default();
            unexpected
                .iter()
                .map(|field| {
                    let hints = suggest(field, &known, 2);
                    if hints.is_empty() {
                        format!("{}: unknown field '{}'", location, field)
                    } else {
                        format!(
                            "{}: unknown field '{}' (did you mean {}?)",
                            location,
                            field,
                            hints.join(", ")
                        )
                    }
                })
                .collect::<Vec<_>>()
                .join("; ")
        }
        ValidationErrorKind::Enum { options } => {
            let allowed: Vec<String> = options
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            let received = args.pointer(&path).and_then(Value::as_str).unwrap_or("");
            let hints = suggest(received, &allowed, 2);
            let mut line = format!("{}: expected one of {}", location, allowed.join(", "));
            if !hints.is_empty() {
                line.push_str(&format!(" (did you mean {}?)", hints.join(", ")));
            }
            line
        }
        _ => format!("{}: {}", location, err),
    }
}

/// The catalog as OpenAI-style function tools, minus the token field the
/// server injects itself.
pub fn tools_for_agent() -> Vec<Value> {
    TOOL_CATALOG
        .iter()
        .map(|tool| {
            let mut parameters = tool.input_schema.clone();
            if let Some(props) = parameters.get_mut("properties").and_then(Value::as_object_mut) {
                props.remove(INJECTED_TOKEN_FIELD);
            }
            if let Some(required) = parameters.get_mut("required").and_then(Value::as_array_mut) {
                required.retain(|field| field != INJECTED_TOKEN_FIELD);
            }
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                }
            })
        })
        .collect()
}

use crate::errors::ToolError;
use crate::utils::suggest::suggest;
use serde_json::json;

/// Builds the validation error for a value outside a closed set, with
/// "did you mean" hints.
pub fn unknown_choice_error(label: &str, value: &str, known: &[&str]) -> ToolError {
    let suggestions = suggest(value, known, 3);
    let mut hint = format!("Use one of: {}.", known.join(", "));
    if !suggestions.is_empty() {
        hint = format!("Did you mean: {}? {}", suggestions.join(", "), hint);
    }
    ToolError::invalid_params(format!("Unknown {}: {}", label, value))
        .with_hint(hint)
        .with_details(json!({
            "known": known,
            "did_you_mean": suggestions,
        }))
}

//! Tool call parsing: normalizes model output to `ToolCall` structs.
//!
//! Supports the two formats selectable per model in `config/models.yaml`:
//!
//! 1. **native_json**: standard OpenAI tool calls in the response delta with
//!    a function name and JSON-encoded arguments. Models that ignore the
//!    `tools` field sometimes print `{"name": …, "arguments": {…}}` in the
//!    text instead; [`parse_inline_json_tool_calls`] picks those up.
//!
//! 2. **pythonic**: text lines of the form
//!    ```text
//!    Tool: get_workout_history
//!    Arguments: {"limit": 5}
//!    ```
//!
//! Arguments go through [`repair_malformed_json`] before giving up, since
//! small models routinely emit trailing commas or drop closing braces.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::errors::InferenceError;
use super::json_repair::{balanced_spans, repair_malformed_json};
use super::types::ToolCall;

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4())
}

/// Parse an arguments string, repairing it if needed. Empty means `{}`.
fn parse_arguments(raw: &str) -> Result<Value, InferenceError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Ok(v);
    }
    match repair_malformed_json(raw) {
        Some(v) => {
            tracing::info!(raw_len = raw.len(), "repaired malformed tool call arguments");
            Ok(v)
        }
        None => Err(InferenceError::ToolCallParseError {
            raw_response: raw.to_string(),
            reason: "arguments are not valid JSON and could not be repaired".into(),
        }),
    }
}

// ─── Native JSON Parsing ────────────────────────────────────────────────────

/// Parse a tool call from accumulated streaming deltas (native_json format).
///
/// `name` and `arguments_json` are the concatenated values from all chunks
/// for a single tool call index.
pub fn parse_native_json_tool_call(
    id: Option<&str>,
    name: &str,
    arguments_json: &str,
) -> Result<ToolCall, InferenceError> {
    if name.trim().is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: "empty tool name".into(),
        });
    }

    Ok(ToolCall {
        id: id.map(String::from).unwrap_or_else(new_call_id),
        name: name.trim().to_string(),
        arguments: parse_arguments(arguments_json)?,
    })
}

/// Find tool calls printed as JSON objects in text content.
///
/// Accepts `{"name": "...", "arguments": {...}}` and the
/// `{"function": {"name": ..., "arguments": ...}}` wrapping. Arguments may be
/// an object or a JSON-encoded string, but must be present: a bare
/// `{"name": ...}` object is far more often data than a call.
pub fn parse_inline_json_tool_calls(text: &str) -> Vec<ToolCall> {
    balanced_spans(text, '{', '}')
        .into_iter()
        .filter_map(repair_malformed_json)
        .filter_map(|value| {
            let call = value.get("function").filter(|f| f.is_object()).unwrap_or(&value);
            let name = call.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let arguments = match call.get("arguments").or_else(|| call.get("parameters")) {
                Some(Value::String(raw)) => parse_arguments(raw).ok()?,
                Some(v @ Value::Object(_)) => v.clone(),
                _ => return None,
            };
            Some(ToolCall {
                id: new_call_id(),
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

// ─── Pythonic Format Parsing ────────────────────────────────────────────────

/// Extract tool calls from text using the `Tool:` / `Arguments:` format.
///
/// A `Tool:` line without a following `Arguments:` line gets `{}`.
pub fn parse_pythonic_tool_calls(text: &str) -> Result<Vec<ToolCall>, InferenceError> {
    let mut calls = Vec::new();
    let lines: Vec<&str> = text.lines().collect();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();

        if let Some(name) = line.strip_prefix("Tool:").or_else(|| line.strip_prefix("tool:")) {
            let tool_name = name.trim().trim_matches('`').to_string();
            if tool_name.is_empty() {
                i += 1;
                continue;
            }

            let next_line = lines.get(i + 1).map(|l| l.trim()).unwrap_or_default();
            let arguments = match next_line
                .strip_prefix("Arguments:")
                .or_else(|| next_line.strip_prefix("arguments:"))
            {
                Some(args_str) => {
                    i += 1;
                    parse_arguments(args_str)?
                }
                None => Value::Object(Map::new()),
            };

            calls.push(ToolCall {
                id: new_call_id(),
                name: tool_name,
                arguments,
            });
        }

        i += 1;
    }

    Ok(calls)
}

// ─── Server Error Recovery ──────────────────────────────────────────────────

/// Extract the raw arguments JSON from an Ollama HTTP 500 error body.
///
/// Ollama returns errors like:
/// ```json
/// {"error":{"message":"error parsing tool call: raw='{...}', err=..."}}
/// ```
///
/// The tool name is not part of the message; only the raw arguments are
/// returned.
pub fn extract_arguments_from_error(error_body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(error_body).ok()?;
    let message = parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())?;

    if !message.contains("error parsing tool call") {
        return None;
    }

    let raw_start = message.find("raw='")? + "raw='".len();
    let raw_end = message[raw_start..].rfind("', err=")?;
    Some(message[raw_start..raw_start + raw_end].to_string())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_json_tool_call() {
        let call = parse_native_json_tool_call(Some("call_1"), "get_workout_history", r#"{"limit": 5}"#).unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "get_workout_history");
        assert_eq!(call.arguments["limit"], 5);
    }

    #[test]
    fn test_native_json_generates_id_and_accepts_empty_args() {
        let call = parse_native_json_tool_call(None, "get_profile", "").unwrap();
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.arguments, serde_json::json!({}));
    }

    #[test]
    fn test_native_json_repairs_arguments() {
        let call = parse_native_json_tool_call(None, "delete_workout", r#"{"workout_id": "w1","#).unwrap();
        assert_eq!(call.arguments["workout_id"], "w1");
    }

    #[test]
    fn test_native_json_empty_name_is_error() {
        assert!(parse_native_json_tool_call(None, "  ", "{}").is_err());
    }

    #[test]
    fn test_native_json_unrepairable_arguments() {
        let err = parse_native_json_tool_call(None, "get_profile", "not json").unwrap_err();
        assert!(matches!(err, InferenceError::ToolCallParseError { .. }));
    }

    #[test]
    fn test_inline_json_tool_calls() {
        let text = r#"Sure. {"name": "navigate_to", "arguments": {"screen": "history"}} and
            {"function": {"name": "get_profile", "arguments": "{}"}}"#;
        let calls = parse_inline_json_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "navigate_to");
        assert_eq!(calls[0].arguments["screen"], "history");
        assert_eq!(calls[1].name, "get_profile");
    }

    #[test]
    fn test_inline_json_ignores_other_objects() {
        assert!(parse_inline_json_tool_calls(r#"{"sets": 3, "reps": 10}"#).is_empty());
        assert!(parse_inline_json_tool_calls(r#"{"name": "Leg Day", "exercises": []}"#).is_empty());
    }

    #[test]
    fn test_pythonic_tool_calls() {
        let text = "Let me check.\n\nTool: get_workout_history\nArguments: {\"limit\": 3}\nTool: get_profile";
        let calls = parse_pythonic_tool_calls(text).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_workout_history");
        assert_eq!(calls[0].arguments["limit"], 3);
        assert_eq!(calls[1].name, "get_profile");
        assert_eq!(calls[1].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_pythonic_no_calls() {
        assert!(parse_pythonic_tool_calls("Just a friendly reply.").unwrap().is_empty());
    }

    #[test]
    fn test_extract_arguments_from_error() {
        let body = r#"{"error":{"message":"error parsing tool call: raw='{\"workout_id\":\"\"w-42\"}', err=invalid character 'w' after object key:value pair"}}"#;
        let raw = extract_arguments_from_error(body).unwrap();
        let repaired = repair_malformed_json(&raw).unwrap();
        assert_eq!(repaired["workout_id"], "w-42");
    }

    #[test]
    fn test_extract_arguments_from_unrelated_error() {
        assert!(extract_arguments_from_error(r#"{"error":{"message":"model not found"}}"#).is_none());
        assert!(extract_arguments_from_error("internal server error").is_none());
    }
}

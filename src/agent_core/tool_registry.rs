//! Declared app-control tools.
//!
//! The catalog is static: it is built once at startup and never changes.
//! Each declaration carries a small parameter schema that is used both to
//! render OpenAI function definitions and to validate model-proposed calls
//! before anything runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::errors::AgentError;

/// Description words that carry no intent signal.
const STOPWORDS: &[&str] = &[
    "about", "each", "every", "from", "into", "over", "such", "that", "their", "this", "user",
    "users", "with", "your",
];

// ─── Types ──────────────────────────────────────────────────────────────────

/// What running a tool does to application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Read-only.
    Query,
    /// Changes state; reversible by the user.
    Mutation,
    /// Deletes data. Never runs without confirmation.
    Destructive,
    /// Client-side screen change; no domain call.
    Navigation,
}

/// JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    fn json_name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// One typed parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    /// Allowed values for string parameters. Empty means unrestricted.
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

impl ToolParameter {
    fn new(name: &str, param_type: ParamType, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required,
            allowed_values: Vec::new(),
        }
    }

    fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// A declared tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
    pub parameters: Vec<ToolParameter>,
    /// Prompt shown before a destructive call. `{param}` placeholders are
    /// filled from the call arguments.
    #[serde(default)]
    pub confirmation_template: Option<String>,
}

impl ToolDeclaration {
    fn new(name: &str, kind: ToolKind, description: &str, parameters: Vec<ToolParameter>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            parameters,
            confirmation_template: None,
        }
    }

    fn confirm_with(mut self, template: &str) -> Self {
        self.confirmation_template = Some(template.to_string());
        self
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter(|p| p.required).map(|p| p.name.as_str())
    }

    /// JSON Schema for the parameters object.
    pub fn parameter_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = serde_json::json!({
                "type": param.param_type.json_name(),
                "description": param.description,
            });
            if !param.allowed_values.is_empty() {
                prop["enum"] = serde_json::json!(param.allowed_values);
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self.required_parameters().collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_openai_tool(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameter_schema(),
            },
        }
    }

    /// Check arguments against the schema: an object (or null for
    /// parameterless calls), required fields present, types and enums
    /// respected. Unknown fields are ignored.
    pub fn validate(&self, arguments: &Value) -> Result<(), AgentError> {
        let invalid = |reason: String| AgentError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(invalid(format!("arguments must be an object, got {other}"))),
        };

        for param in &self.parameters {
            let Some(value) = args.get(&param.name).filter(|v| !v.is_null()) else {
                if param.required {
                    return Err(invalid(format!("missing required field: '{}'", param.name)));
                }
                continue;
            };
            if !param.param_type.accepts(value) {
                return Err(invalid(format!(
                    "field '{}' must be a {}",
                    param.name,
                    param.param_type.json_name()
                )));
            }
            if !param.allowed_values.is_empty() {
                let allowed = value
                    .as_str()
                    .is_some_and(|s| param.allowed_values.iter().any(|a| a == s));
                if !allowed {
                    return Err(invalid(format!(
                        "field '{}' must be one of: {}",
                        param.name,
                        param.allowed_values.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// The confirmation prompt for a call with these arguments.
    pub fn confirmation_prompt(&self, arguments: &Value) -> String {
        let Some(template) = &self.confirmation_template else {
            return format!("Run '{}' with {arguments}? This cannot be undone.", self.name);
        };
        let mut prompt = template.clone();
        if let Some(args) = arguments.as_object() {
            for (key, value) in args {
                let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                prompt = prompt.replace(&format!("{{{key}}}"), &text);
            }
        }
        prompt
    }

    /// Lowercase words from the name (split on `_`) and the description.
    /// Returned separately: name words are the stronger signal.
    pub fn keywords(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let name_words = self
            .name
            .split('_')
            .filter(|w| w.len() >= 3 && *w != "get")
            .map(singular)
            .collect();
        let description_words = self
            .description
            .to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| w.len() >= 4 && !STOPWORDS.contains(w))
            .map(singular)
            .collect();
        (name_words, description_words)
    }
}

fn singular(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') && stem.len() >= 3 => stem.to_string(),
        _ => word.to_string(),
    }
}

// ─── Catalog ────────────────────────────────────────────────────────────────

/// The immutable set of declared tools.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDeclaration>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDeclaration>) -> Self {
        Self { tools }
    }

    /// The application's tool set.
    pub fn builtin() -> Self {
        use ParamType::{Integer, String as Text};

        Self::new(vec![
            ToolDeclaration::new(
                "navigate_to",
                ToolKind::Navigation,
                "Open a screen of the app: home, workouts, history, progress, profile or settings.",
                vec![ToolParameter::new("screen", Text, true, "Screen to open").one_of(&[
                    "home", "workouts", "history", "progress", "profile", "settings",
                ])],
            ),
            ToolDeclaration::new(
                "get_workout_history",
                ToolKind::Query,
                "Show past logged sessions, newest first.",
                vec![ToolParameter::new("limit", Integer, false, "Maximum sessions to return")],
            ),
            ToolDeclaration::new(
                "get_workout_details",
                ToolKind::Query,
                "Show one logged session by its id.",
                vec![ToolParameter::new("workout_id", Text, true, "Id of the logged workout")],
            ),
            ToolDeclaration::new(
                "get_muscle_volume",
                ToolKind::Query,
                "Report logged volume per muscle group.",
                vec![ToolParameter::new("muscle", Text, false, "Single muscle id to report")],
            ),
            ToolDeclaration::new("get_profile", ToolKind::Query, "Show the user's profile.", vec![]),
            ToolDeclaration::new(
                "update_settings",
                ToolKind::Mutation,
                "Change an app setting such as units, theme or notifications.",
                vec![
                    ToolParameter::new("setting", Text, true, "Setting to change").one_of(&[
                        "units",
                        "theme",
                        "notifications",
                        "rest_timer",
                    ]),
                    ToolParameter::new("value", Text, true, "New value"),
                ],
            ),
            ToolDeclaration::new(
                "update_profile",
                ToolKind::Mutation,
                "Change profile fields: level, equipment or goal.",
                vec![
                    ToolParameter::new("fitness_level", Text, false, "Training experience")
                        .one_of(&["beginner", "intermediate", "advanced"]),
                    ToolParameter::new("equipment", Text, false, "Comma-separated equipment list"),
                    ToolParameter::new("goal", Text, false, "Training goal"),
                ],
            ),
            ToolDeclaration::new(
                "delete_workout",
                ToolKind::Destructive,
                "Permanently delete one logged workout.",
                vec![ToolParameter::new("workout_id", Text, true, "Id of the workout to delete")],
            )
            .confirm_with("Delete workout '{workout_id}'? This cannot be undone."),
            ToolDeclaration::new(
                "clear_workout_history",
                ToolKind::Destructive,
                "Permanently erase the whole logged history.",
                vec![],
            )
            .confirm_with("Erase your entire workout history? This cannot be undone."),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn to_openai_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDeclaration::to_openai_tool).collect()
    }

    /// Union of all tool keywords, as `(name words, description words)`.
    pub fn keywords(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut names = BTreeSet::new();
        let mut descriptions = BTreeSet::new();
        for tool in &self.tools {
            let (n, d) = tool.keywords();
            names.extend(n);
            descriptions.extend(d);
        }
        (names, descriptions)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.tools().len(), 9);
        assert_eq!(catalog.get("delete_workout").unwrap().kind, ToolKind::Destructive);
        assert_eq!(catalog.get("navigate_to").unwrap().kind, ToolKind::Navigation);
        assert!(catalog.get("hack_database").is_none());
    }

    #[test]
    fn test_openai_rendering() {
        let tools = ToolCatalog::builtin().to_openai_tools();
        let nav = tools.iter().find(|t| t.function.name == "navigate_to").unwrap();
        assert_eq!(nav.r#type, "function");
        assert_eq!(nav.function.parameters["required"], json!(["screen"]));
        assert_eq!(nav.function.parameters["properties"]["screen"]["enum"][1], "workouts");

        let profile = tools.iter().find(|t| t.function.name == "get_profile").unwrap();
        assert_eq!(profile.function.parameters["required"], json!([]));
    }

    #[test]
    fn test_validate_required_type_and_enum() {
        let catalog = ToolCatalog::builtin();
        let nav = catalog.get("navigate_to").unwrap();
        assert!(nav.validate(&json!({"screen": "history"})).is_ok());
        assert!(nav.validate(&json!({})).is_err());
        assert!(nav.validate(&json!({"screen": "admin"})).is_err());
        assert!(nav.validate(&json!({"screen": 3})).is_err());
        assert!(nav.validate(&json!("history")).is_err());

        let history = catalog.get("get_workout_history").unwrap();
        assert!(history.validate(&json!({"limit": 5})).is_ok());
        assert!(history.validate(&json!({"limit": "five"})).is_err());
        assert!(history.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_confirmation_prompt_fills_placeholders() {
        let catalog = ToolCatalog::builtin();
        let prompt = catalog
            .get("delete_workout")
            .unwrap()
            .confirmation_prompt(&json!({"workout_id": "w-2"}));
        assert_eq!(prompt, "Delete workout 'w-2'? This cannot be undone.");

        let query = catalog.get("get_profile").unwrap();
        assert!(query.confirmation_prompt(&json!({})).starts_with("Run 'get_profile'"));
    }

    #[test]
    fn test_keywords_from_names_and_descriptions() {
        let (names, descriptions) = ToolCatalog::builtin().keywords();
        assert!(names.contains("delete"));
        assert!(names.contains("setting"));
        assert!(!names.contains("get"));
        assert!(descriptions.contains("screen"));
        assert!(descriptions.contains("progress"));
        assert!(!descriptions.contains("user"));
    }
}

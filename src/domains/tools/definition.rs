//! Tool definitions as declared by workers.
//!
//! A definition is plain data: the worker side owns the behaviour, the bridge
//! only advertises the tool and routes calls to it by name.

use std::sync::Arc;

use rmcp::model::Tool;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ToolError;

/// A tool as declared over the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Description shown to clients.
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool arguments.
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Check that this definition can be advertised to clients.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.name.trim().is_empty() {
            return Err(ToolError::invalid_definition(&self.name, "name must not be empty"));
        }

        if self.name.chars().any(char::is_whitespace) {
            return Err(ToolError::invalid_definition(
                &self.name,
                "name must not contain whitespace",
            ));
        }

        if !self.input_schema.is_object() {
            return Err(ToolError::invalid_definition(
                &self.name,
                "inputSchema must be a JSON object",
            ));
        }

        Ok(())
    }

    /// Build the MCP tool model advertised to clients.
    pub fn to_tool(&self) -> Result<Tool, ToolError> {
        self.validate()?;

        let Value::Object(schema) = &self.input_schema else {
            return Err(ToolError::invalid_definition(
                &self.name,
                "inputSchema must be a JSON object",
            ));
        };

        let description = if self.description.is_empty() {
            None
        } else {
            Some(self.description.clone().into())
        };

        Ok(Tool {
            name: self.name.clone().into(),
            description,
            input_schema: Arc::new(schema.clone()),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_defaults() {
        let def: ToolDefinition = serde_json::from_value(json!({ "name": "echo" })).unwrap();
        assert_eq!(def.name, "echo");
        assert_eq!(def.description, "");
        assert_eq!(def.input_schema, json!({ "type": "object" }));
    }

    #[test]
    fn test_deserialize_camel_case_schema() {
        let def: ToolDefinition = serde_json::from_value(json!({
            "name": "sum",
            "description": "Add numbers",
            "inputSchema": { "type": "object", "properties": { "a": { "type": "number" } } }
        }))
        .unwrap();
        assert_eq!(def.input_schema["properties"]["a"]["type"], "number");
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let def = ToolDefinition::new("  ", "", json!({}));
        assert!(matches!(def.validate(), Err(ToolError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_validate_rejects_whitespace_in_name() {
        let def = ToolDefinition::new("two words", "", json!({}));
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_object_schema() {
        let def = ToolDefinition::new("echo", "", json!("string"));
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("inputSchema"));
    }

    #[test]
    fn test_to_tool() {
        let def = ToolDefinition::new("echo", "Echo input", json!({ "type": "object" }));
        let tool = def.to_tool().unwrap();
        assert_eq!(tool.name, "echo");
        assert_eq!(tool.description.as_deref(), Some("Echo input"));
        assert_eq!(tool.input_schema.get("type"), Some(&json!("object")));
    }

    #[test]
    fn test_to_tool_without_description() {
        let def = ToolDefinition::new("echo", "", json!({}));
        assert!(def.to_tool().unwrap().description.is_none());
    }
}

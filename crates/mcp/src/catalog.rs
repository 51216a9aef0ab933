//! Tool catalog negotiated at handshake time.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Tool;

/// Declared JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
    /// No type declared, or a type this client does not know.
    Any,
}

impl ParamType {
    fn from_schema_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            "null" => Self::Null,
            _ => Self::Any,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub required: bool,
    /// Whether `null` is an accepted value (`"type": ["string", "null"]`).
    pub nullable: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// Declared shape of one remote tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Parameters in schema declaration order.
    pub params: IndexMap<String, ParamSpec>,
    /// The raw JSON Schema the server advertised.
    pub input_schema: Value,
}

impl ToolSpec {
    /// Names of required parameters, in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}

impl From<Tool> for ToolSpec {
    fn from(tool: Tool) -> Self {
        let params = params_from_schema(&tool.input_schema);
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            params,
            input_schema: tool.input_schema,
        }
    }
}

fn params_from_schema(schema: &Value) -> IndexMap<String, ParamSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut params = IndexMap::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            let (kind, nullable) = declared_type(prop.get("type"));
            params.insert(
                name.clone(),
                ParamSpec {
                    kind,
                    required: required.contains(&name.as_str()),
                    nullable,
                    default: prop.get("default").cloned(),
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
            );
        }
    }

    // A name can be required without a matching property entry.
    for name in required {
        params.entry(name.to_string()).or_insert(ParamSpec {
            kind: ParamType::Any,
            required: true,
            nullable: false,
            default: None,
            description: None,
        });
    }

    params
}

fn declared_type(value: Option<&Value>) -> (ParamType, bool) {
    match value {
        Some(Value::String(name)) => {
            let kind = ParamType::from_schema_name(name);
            (kind, kind == ParamType::Null)
        }
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let kind = names
                .iter()
                .find(|name| **name != "null")
                .map(|name| ParamType::from_schema_name(name))
                .unwrap_or(ParamType::Null);
            (kind, nullable)
        }
        _ => (ParamType::Any, false),
    }
}

/// Ordered set of tools offered by one server.
///
/// Read-only once the handshake has produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    /// Build a catalog, keeping the first spec when a name repeats.
    pub fn new(specs: impl IntoIterator<Item = ToolSpec>) -> Self {
        let mut tools: Vec<ToolSpec> = Vec::new();
        for spec in specs {
            if tools.iter().any(|t| t.name == spec.name) {
                tracing::warn!(tool = %spec.name, "duplicate tool name in catalog, ignoring");
                continue;
            }
            tools.push(spec);
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolSpec> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl From<Vec<Tool>> for ToolCatalog {
    fn from(tools: Vec<Tool>) -> Self {
        Self::new(tools.into_iter().map(ToolSpec::from))
    }
}

impl<'a> IntoIterator for &'a ToolCatalog {
    type Item = &'a ToolSpec;
    type IntoIter = std::slice::Iter<'a, ToolSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, schema: Value) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: schema,
        }
    }

    #[test]
    fn params_follow_schema_order() {
        let spec = ToolSpec::from(tool(
            "search",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "what to find"},
                    "limit": {"type": "integer", "default": 10},
                    "cursor": {"type": ["string", "null"]}
                },
                "required": ["query"]
            }),
        ));

        let names: Vec<&str> = spec.params.keys().map(String::as_str).collect();
        assert_eq!(names, ["query", "limit", "cursor"]);
        assert!(spec.params["query"].required);
        assert_eq!(spec.params["limit"].default, Some(json!(10)));
        assert_eq!(spec.params["cursor"].kind, ParamType::String);
        assert!(spec.params["cursor"].nullable);
        assert_eq!(spec.required().collect::<Vec<_>>(), ["query"]);
    }

    #[test]
    fn required_without_property_is_any() {
        let spec = ToolSpec::from(tool("x", json!({"required": ["token"]})));
        assert_eq!(spec.params["token"].kind, ParamType::Any);
        assert!(spec.params["token"].required);
    }

    #[test]
    fn catalog_keeps_first_duplicate() {
        let catalog = ToolCatalog::from(vec![
            tool("add", json!({})),
            tool("sub", json!({})),
            tool("add", json!({"properties": {"z": {}}})),
        ]);
        assert_eq!(catalog.names(), ["add", "sub"]);
        assert!(catalog.get("add").unwrap().params.is_empty());
        assert!(catalog.get("mul").is_none());
    }
}

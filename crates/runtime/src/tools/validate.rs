//! Argument validation against a tool's declared parameters.

use mcp::{ParamSpec, ParamType, ToolCatalog, ToolSpec};
use serde_json::{Map, Number, Value};

use super::errors::ValidationError;
use super::types::ToolInvocation;

/// Check an invocation against the catalog and return coerced arguments.
pub fn validate<'c>(
    invocation: &ToolInvocation,
    catalog: &'c ToolCatalog,
) -> Result<(&'c ToolSpec, Map<String, Value>), ValidationError> {
    let spec = catalog
        .get(&invocation.name)
        .ok_or_else(|| ValidationError::UnknownTool {
            tool: invocation.name.clone(),
        })?;

    let missing: Vec<String> = spec
        .required()
        .filter(|name| !invocation.arguments.contains_key(*name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingParams {
            tool: spec.name.clone(),
            missing,
        });
    }

    let mut arguments = Map::with_capacity(invocation.arguments.len());
    for (name, value) in &invocation.arguments {
        let value = match spec.params.get(name) {
            Some(param) => coerce(value, param).ok_or_else(|| ValidationError::TypeMismatch {
                tool: spec.name.clone(),
                param: name.clone(),
                expected: param.kind,
            })?,
            None => value.clone(),
        };
        arguments.insert(name.clone(), value);
    }

    Ok((spec, arguments))
}

/// Convert `value` toward the declared type, or `None` if that is not safe.
fn coerce(value: &Value, param: &ParamSpec) -> Option<Value> {
    if value.is_null() {
        return (param.nullable || matches!(param.kind, ParamType::Null | ParamType::Any))
            .then_some(Value::Null);
    }

    match (param.kind, value) {
        (ParamType::Any, v) => Some(v.clone()),
        (ParamType::String, Value::String(_))
        | (ParamType::Number, Value::Number(_))
        | (ParamType::Boolean, Value::Bool(_))
        | (ParamType::Array, Value::Array(_))
        | (ParamType::Object, Value::Object(_)) => Some(value.clone()),

        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (ParamType::Number, Value::String(s)) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Value::from(i));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }

        (ParamType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                return Some(value.clone());
            }
            n.as_f64().and_then(integral).map(Value::from)
        }
        (ParamType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(Value::from)
        }

        (ParamType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        (ParamType::Array, Value::String(s)) if s.trim_start().starts_with('[') => {
            serde_json::from_str::<Value>(s).ok().filter(Value::is_array)
        }
        (ParamType::Object, Value::String(s)) if s.trim_start().starts_with('{') => {
            serde_json::from_str::<Value>(s).ok().filter(Value::is_object)
        }

        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp::Tool;
    use serde_json::json;

    fn catalog() -> ToolCatalog {
        ToolCatalog::from(vec![Tool {
            name: "demo".into(),
            description: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"},
                    "ratio": {"type": "number"},
                    "label": {"type": "string"},
                    "flag": {"type": "boolean"},
                    "items": {"type": "array"},
                    "opts": {"type": "object"},
                    "note": {"type": ["string", "null"]}
                },
                "required": ["a", "b"]
            }),
        }])
    }

    fn invocation(args: Value) -> ToolInvocation {
        let Value::Object(map) = args else { panic!("object") };
        ToolInvocation::new("demo", map)
    }

    fn coerced(args: Value) -> Value {
        let catalog = catalog();
        let (_, arguments) = validate(&invocation(args), &catalog).unwrap();
        Value::Object(arguments)
    }

    #[test]
    fn missing_required_params_are_named_exactly() {
        let catalog = catalog();
        let err = validate(&invocation(json!({"a": 1})), &catalog).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParams {
                tool: "demo".into(),
                missing: vec!["b".into()],
            }
        );

        let err = validate(&invocation(json!({})), &catalog).unwrap_err();
        let ValidationError::MissingParams { missing, .. } = err else { panic!() };
        assert_eq!(missing, ["a", "b"]);
    }

    #[test]
    fn unknown_tool() {
        let catalog = catalog();
        let err = validate(&ToolInvocation::new("nope", Map::new()), &catalog).unwrap_err();
        assert_eq!(err, ValidationError::UnknownTool { tool: "nope".into() });
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let args = coerced(json!({"a": "2", "b": 3.0, "ratio": "0.5"}));
        assert_eq!(args, json!({"a": 2, "b": 3, "ratio": 0.5}));
    }

    #[test]
    fn scalars_coerce_to_string_and_bool() {
        let args = coerced(json!({"a": 1, "b": 2, "label": 42, "flag": "TRUE"}));
        assert_eq!(args["label"], "42");
        assert_eq!(args["flag"], true);
    }

    #[test]
    fn json_strings_coerce_to_containers() {
        let args = coerced(json!({"a": 1, "b": 2, "items": " [1, 2]", "opts": "{\"k\": 1}"}));
        assert_eq!(args["items"], json!([1, 2]));
        assert_eq!(args["opts"], json!({"k": 1}));
    }

    #[test]
    fn undeclared_params_pass_through() {
        let args = coerced(json!({"a": 1, "b": 2, "extra": "kept"}));
        assert_eq!(args["extra"], "kept");
    }

    #[test]
    fn unconvertible_values_are_type_mismatches() {
        let catalog = catalog();
        let cases = [
            (json!({"a": "two", "b": 1}), "a", ParamType::Integer),
            (json!({"a": 1.5, "b": 1}), "a", ParamType::Integer),
            (json!({"a": 1, "b": 1, "flag": "yes"}), "flag", ParamType::Boolean),
            (json!({"a": 1, "b": 1, "items": "1, 2"}), "items", ParamType::Array),
            (json!({"a": 1, "b": 1, "opts": "[1]"}), "opts", ParamType::Object),
            (json!({"a": 1, "b": 1, "label": null}), "label", ParamType::String),
        ];
        for (args, param, expected) in cases {
            let err = validate(&invocation(args), &catalog).unwrap_err();
            assert_eq!(
                err,
                ValidationError::TypeMismatch {
                    tool: "demo".into(),
                    param: param.into(),
                    expected,
                }
            );
        }
    }

    #[test]
    fn null_is_accepted_for_nullable_params() {
        let args = coerced(json!({"a": 1, "b": 2, "note": null}));
        assert!(args["note"].is_null());
    }
}

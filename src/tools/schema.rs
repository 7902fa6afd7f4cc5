//! 工具参数 JSON Schema：schemars 生成 + 轻量校验
//!
//! 校验只覆盖 schemars 会产出的子集：type / properties / required / additionalProperties /
//! items / enum / minimum / maximum / anyOf / allOf 以及指向 `#/definitions/*` 的本地 $ref。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 由参数结构体生成参数 schema（去掉 `$schema` 元信息）
pub fn parameters_schema<A: JsonSchema>() -> Value {
    let schema = schema_for!(A);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| empty_object_schema());
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
    }
    value
}

/// 无参数工具的 schema
pub fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 按 schema 校验参数；返回首个不符合处的描述（带 JSON 路径）
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let definitions = schema.get("definitions").and_then(Value::as_object);
    validate_node(schema, args, definitions, "$")
}

fn validate_node(
    schema: &Value,
    value: &Value,
    definitions: Option<&Map<String, Value>>,
    path: &str,
) -> Result<(), String> {
    let schema = match schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(format!("{path}: no value allowed")),
        Value::Object(map) => map,
        _ => return Ok(()),
    };

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(reference, definitions)
            .ok_or_else(|| format!("{path}: unresolved schema reference {reference}"))?;
        return validate_node(target, value, definitions, path);
    }

    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        for sub in all {
            validate_node(sub, value, definitions, path)?;
        }
    }

    if let Some(any) = schema.get("anyOf").and_then(Value::as_array) {
        if !any
            .iter()
            .any(|sub| validate_node(sub, value, definitions, path).is_ok())
        {
            return Err(format!("{path}: does not match any allowed shape"));
        }
    }

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            return Err(format!(
                "{path}: expected {}, got {}",
                expected,
                json_type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} is not one of {}", Value::Array(allowed.clone())));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(format!("{path}: {n} is below minimum {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(format!("{path}: {n} is above maximum {max}"));
            }
        }
    }

    if let Value::Object(obj) = value {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    return Err(format!("{path}: missing required field '{key}'"));
                }
            }
        }

        for (key, field) in obj {
            let child = format!("{path}.{key}");
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => validate_node(field_schema, field, definitions, &child)?,
                None => match schema.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        return Err(format!("{path}: unexpected field '{key}'"));
                    }
                    Some(extra @ Value::Object(_)) => {
                        validate_node(extra, field, definitions, &child)?
                    }
                    _ => {}
                },
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_node(item_schema, item, definitions, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn resolve_ref<'a>(reference: &str, definitions: Option<&'a Map<String, Value>>) -> Option<&'a Value> {
    let name = reference.strip_prefix("#/definitions/")?;
    definitions?.get(name)
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

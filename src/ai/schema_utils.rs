use crate::error::MetaError;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Renders the JSON schema of `T` as an instruction block to append to a
/// system prompt.
pub fn schema_instructions<T: JsonSchema>() -> String {
    let schema = clean_schema(schema_for!(T)).unwrap_or(Value::Null);
    let text = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!("REQUIRED OUTPUT SCHEMA:\n{text}")
}

/// Strips schemars metadata the model has no use for.
pub fn clean_schema<T: serde::Serialize>(root: T) -> serde_json::Result<Value> {
    let mut root_val = serde_json::to_value(root)?;
    process_schema_node(&mut root_val, 0);

    if let Value::Object(ref mut map) = root_val {
        map.remove("$schema");
        map.remove("title");
        map.remove("definitions");
        map.remove("$defs");
    }

    Ok(root_val)
}

fn process_schema_node(node: &mut Value, depth: usize) {
    if depth > 20 {
        return;
    }

    if let Value::Object(map) = node {
        map.remove("title");
        map.remove("default");
        map.remove("format");

        // ["string", "null"] -> "string"
        if let Some(Value::Array(types)) = map.get("type") {
            if let Some(real_type) = types.iter().find(|t| t.as_str() != Some("null")).cloned() {
                map.insert("type".to_string(), real_type);
            }
        }

        if let Some(Value::Object(props)) = map.get_mut("properties") {
            for val in props.values_mut() {
                process_schema_node(val, depth + 1);
            }
        }

        if let Some(val) = map.get_mut("items") {
            process_schema_node(val, depth + 1);
        }
    }
}

/// Parses a structured reply into `T`.
///
/// Tolerates code fences and prose around the object; anything that is not a
/// JSON object is a `MalformedResponse`.
pub fn parse_structured<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, MetaError> {
    let content = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if content.is_empty() {
        return Err(MetaError::MalformedResponse(format!("{what}: empty response")));
    }

    let json_str = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => {
            return Err(MetaError::MalformedResponse(format!(
                "{what}: no JSON object in response: {}",
                truncate(content, 200)
            )));
        }
    };

    serde_json::from_str(json_str).map_err(|e| {
        MetaError::MalformedResponse(format!(
            "{what}: {e}. Content was: {}",
            truncate(json_str, 200)
        ))
    })
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... (len: {})", &s[..idx], s.chars().count()),
        None => s.to_string(),
    }
}

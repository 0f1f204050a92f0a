//! JSON schema generation for structured LLM output.

use schemars::{schema_for, JsonSchema};

/// A named JSON schema sent alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    /// Build a strict, fully inlined schema for `T`.
    ///
    /// Strict structured-output APIs require:
    /// 1. `additionalProperties: false` on all object schemas
    /// 2. every property listed in `required`, nullable ones included
    /// 3. no `$ref` indirection
    pub fn for_type<T: JsonSchema>() -> Self {
        let schema = schema_for!(T);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        close_objects(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        Self {
            name: <T as JsonSchema>::schema_name(),
            schema: value,
        }
    }
}

fn close_objects(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );

                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(keys));
                }
            }

            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                close_objects(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = match value {
        serde_json::Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(path)) = map.get("$ref").cloned() {
                if let Some(name) = path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(name) {
                        *value = def.clone();
                        inline_refs_with(value, definitions);
                        return;
                    }
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [single] = all_of.as_slice() {
                    *value = single.clone();
                    inline_refs_with(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_with(v, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;

    #[test]
    fn test_analysis_schema_is_inlined_and_closed() {
        let schema = OutputSchema::for_type::<AnalysisResult>();
        assert_eq!(schema.name, "AnalysisResult");

        let text = serde_json::to_string(&schema.schema).unwrap();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("definitions"));
        assert!(text.contains("additionalProperties"));
        assert!(text.contains("downloadLinks"));
        assert!(text.contains("iframeUrl"));

        let required = schema.schema["required"].as_array().unwrap();
        assert!(required.iter().any(|k| k == "streamingLogic"));
        assert!(required.iter().any(|k| k == "extractionStrategy"));
    }
}

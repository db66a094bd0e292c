use serde::Serialize;
use serde_json::{json, Map, Value};

const MAX_DEPTH: usize = 20;
const MAX_REF_HOPS: usize = 10;
const DROPPED_KEYS: &[&str] = &[
    "$ref",
    "$schema",
    "$id",
    "title",
    "default",
    "examples",
    "additionalProperties",
];

pub fn response_schema<T: Serialize>(root: T) -> serde_json::Result<Value> {
    let mut root_val = serde_json::to_value(root)?;

    let definitions = root_val
        .get("definitions")
        .or_else(|| root_val.get("$defs"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    simplify(&mut root_val, &definitions, 0);

    if let Value::Object(map) = &mut root_val {
        map.remove("definitions");
        map.remove("$defs");
    }

    Ok(root_val)
}

fn resolve_refs(node: &mut Value, definitions: &Map<String, Value>) {
    for _ in 0..MAX_REF_HOPS {
        let target = node
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.rsplit('/').next())
            .map(str::to_string);

        let Some(name) = target else { return };
        *node = definitions
            .get(&name)
            .cloned()
            .unwrap_or_else(|| json!({ "type": "object", "description": "Unresolvable reference" }));
    }
}

fn simplify(node: &mut Value, definitions: &Map<String, Value>, depth: usize) {
    if depth > MAX_DEPTH {
        *node = json!({ "type": "object", "nullable": true });
        return;
    }

    resolve_refs(node, definitions);

    if let Value::Bool(allow_all) = node {
        *node = if *allow_all {
            json!({ "type": "string", "nullable": true })
        } else {
            json!({ "not": {} })
        };
    }

    match node {
        Value::Object(map) => {
            for key in DROPPED_KEYS {
                map.remove(*key);
            }

            // Option<T> comes out as ["T", "null"].
            if let Some(Value::Array(types)) = map.get("type") {
                let nullable = types.contains(&json!("null"));
                let first = types.iter().find(|t| *t != &json!("null")).cloned();
                if let Some(real_type) = first {
                    map.insert("type".to_string(), real_type);
                    if nullable {
                        map.insert("nullable".to_string(), json!(true));
                    }
                }
            }

            // Unsigned formats like "uint8" are not understood upstream.
            if map.get("format").and_then(Value::as_str).is_some_and(|f| f.starts_with("uint")) {
                map.insert("format".to_string(), json!("int32"));
            }

            if let Some(Value::Object(props)) = map.get_mut("properties") {
                for val in props.values_mut() {
                    simplify(val, definitions, depth + 1);
                }
            }

            if let Some(val) = map.get_mut("items") {
                simplify(val, definitions, depth + 1);
            }

            for key in ["allOf", "anyOf", "oneOf"] {
                if let Some(Value::Array(arr)) = map.get_mut(key) {
                    for item in arr.iter_mut() {
                        simplify(item, definitions, depth + 1);
                    }
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                simplify(item, definitions, depth + 1);
            }
        }
        _ => {}
    }
}

//! Output schema discovery and extraction for process node responses

use motorcore::{FieldDef, Map, Value, ValueExt};

/// Name of the synthetic field describing an array response
pub const ARRAY_FIELD: &str = "campoMultiple";

/// Infer output fields from a raw response.
///
/// Objects yield one field per top-level key. Arrays yield a single
/// `campoMultiple` field of type `array` whose subfields come from the
/// first element.
pub fn discover_fields(
    raw: &str,
    response_type: Option<&str>,
    parent_tag: Option<&str>,
) -> Result<Vec<FieldDef>, String> {
    let response_type = response_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("json")
        .to_lowercase();
    if response_type != "json" {
        return Err(format!("unsupported response type '{}'", response_type));
    }

    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| format!("response is not valid JSON: {}", e))?;
    let root = descend(&parsed, parent_tag)
        .ok_or_else(|| format!("tag '{}' not found in response", parent_tag.unwrap_or("")))?;

    match root {
        Value::Object(map) => Ok(describe(map)),
        Value::Array(items) => {
            let first = items
                .first()
                .ok_or_else(|| "response array is empty".to_string())?;
            let element = first
                .as_object()
                .ok_or_else(|| "response array elements are not objects".to_string())?;
            Ok(vec![FieldDef {
                name: ARRAY_FIELD.to_string(),
                kind: "array".to_string(),
                subfields: describe(element),
            }])
        }
        other => Err(format!("cannot derive fields from a {} response", other.kind_name())),
    }
}

/// Copy the declared fields out of a parsed response.
///
/// For array responses every field declared as `array` receives the whole array.
pub fn extract_values(parsed: &Value, fields: &[FieldDef], parent_tag: Option<&str>) -> Map {
    let mut values = Map::new();
    match descend(parsed, parent_tag) {
        Some(Value::Object(map)) => {
            for field in fields {
                if let Some(value) = map.get(&field.name) {
                    values.insert(field.name.clone(), value.clone());
                }
            }
        }
        Some(Value::Array(items)) => {
            for field in fields.iter().filter(|f| f.kind == "array") {
                values.insert(field.name.clone(), Value::Array(items.clone()));
            }
        }
        _ => {}
    }
    values
}

fn descend<'a>(value: &'a Value, parent_tag: Option<&str>) -> Option<&'a Value> {
    match parent_tag.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tag) => value.get(tag),
        None => Some(value),
    }
}

fn describe(map: &Map) -> Vec<FieldDef> {
    map.iter()
        .map(|(name, value)| FieldDef::new(name.clone(), value.kind_name()))
        .collect()
}

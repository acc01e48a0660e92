//! Configuration merge logic
//!
//! Sources are merged lowest priority first:
//! - Objects: deep-merge by key, existing keys keep their position
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

use crate::error::CfError;

/// Deep merge two JSON values.
///
/// Merge semantics:
/// - Objects: deep-merge by key (recursive)
/// - Arrays: REPLACE (second wins entirely)
/// - Scalars: override (second wins)
/// - Null: override (null can override any value)
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both objects: deep merge in place so declaration order survives
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = slot.take();
                        *slot = deep_merge(base_value, overlay_value);
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }

        // Arrays: REPLACE (no concatenation)
        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        // Scalars and any other case: overlay wins
        (_, overlay) => overlay,
    }
}

/// Merge multiple layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Object(Map::new()), deep_merge)
}

/// Merge sources after checking every one of them is a mapping.
///
/// The check runs over all sources before any merging happens.
pub fn merge_sources(sources: Vec<Value>) -> Result<Value, CfError> {
    for (index, source) in sources.iter().enumerate() {
        ensure_mapping(source, &format!("source #{}", index))?;
    }
    Ok(merge_layers(sources))
}

/// Fail unless a source is a mapping at top level
pub(crate) fn ensure_mapping(value: &Value, what: &str) -> Result<(), CfError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(CfError::Config(format!(
            "{} must be a mapping at top level, got {}",
            what,
            kind_of(value)
        )))
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

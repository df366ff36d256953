//! Field-by-field merging of configuration tiers.
//!
//! Tiers are parsed into `serde_json::Value` first so a higher tier only has
//! to mention the keys it changes. Arrays are replaced entirely.

use serde_json::Value;

/// Deep merge two values, with `overlay` taking precedence over `base`.
///
/// Objects merge recursively. A null overlay keeps the base, since YAML
/// writes an empty key as null. Anything else in the overlay replaces the base.
///
/// # Example
/// ```
/// use serde_json::json;
/// use meeting_planner::config::deep_merge;
///
/// let project = json!({ "ids": { "task_id_words": 2, "id_case": "snake" } });
/// let user = json!({ "ids": { "task_id_words": 4 } });
/// let merged = deep_merge(project, user);
/// assert_eq!(merged, json!({ "ids": { "task_id_words": 4, "id_case": "snake" } }));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers in order, later tiers winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

//! Partial-merge policy applied when an import meets an existing row.

use serde_json::Value;

/// Non-null wins: an incoming `None` never clears an existing value.
pub fn merge_scalar<T>(existing: Option<T>, incoming: Option<T>) -> Option<T> {
    incoming.or(existing)
}

/// Key union of two metadata maps, incoming keys overwriting existing ones.
/// Mirrors `jsonb || jsonb` for objects; any other shape is replaced.
pub fn merge_metadata(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(update)) => {
            let mut merged = current.clone();
            for (key, value) in update {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

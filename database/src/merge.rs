use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Overlays each incoming entry onto the cached entry with the same `handle`.
///
/// Incoming keys win, keys only the cached entry has survive. The output has
/// the incoming order and membership; cached handles absent from the incoming
/// set are dropped. Entries without a string `handle` pass through unmerged.
/// Applying the same incoming set twice yields the same result.
pub fn merge_with_cache(cached: &[Value], incoming: &[Value]) -> Vec<Value> {
    let cached_by_handle: HashMap<&str, &Map<String, Value>> = cached
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let handle = object.get("handle")?.as_str()?;
            Some((handle, object))
        })
        .collect();

    let mut carried = 0usize;
    let merged = incoming
        .iter()
        .map(|entry| {
            let Some(object) = entry.as_object() else {
                return entry.clone();
            };
            let Some(previous) = object
                .get("handle")
                .and_then(Value::as_str)
                .and_then(|handle| cached_by_handle.get(handle))
            else {
                return entry.clone();
            };

            let mut combined = (*previous).clone();
            for (key, value) in object {
                combined.insert(key.clone(), value.clone());
            }
            carried += 1;
            Value::Object(combined)
        })
        .collect();

    debug!(
        incoming = incoming.len(),
        cached = cached.len(),
        carried,
        "Merged remote snapshot with cache"
    );
    merged
}

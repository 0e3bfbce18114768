//! Minimal read-only field access over resources.
//!
//! Supports dotted member paths such as `OperationDefinition.system` or
//! `parameter.name`. A leading segment equal to the resource type is skipped.
//! As in FHIRPath, every step yields a collection: arrays are flattened and
//! missing members produce an empty collection.

use serde_json::Value;

use crate::resource::Resource;

/// Evaluates a dotted path against a resource and returns the flattened
/// collection of matching values.
pub fn evaluate<'a>(resource: &'a Resource, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
    if segments.peek() == Some(&resource.resource_type()) {
        segments.next();
    }

    let mut current: Vec<&Value> = vec![resource.as_value()];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value.get(segment) {
                Some(Value::Array(items)) => next.extend(items.iter()),
                Some(Value::Null) | None => {}
                Some(other) => next.push(other),
            }
        }
        current = next;
    }
    current
}

/// Evaluates a path expected to yield a single boolean.
///
/// Returns `None` when the path is empty or the first item is not a boolean.
pub fn boolean(resource: &Resource, path: &str) -> Option<bool> {
    evaluate(resource, path).first().and_then(|v| v.as_bool())
}

/// Evaluates a path and keeps the string items.
pub fn strings<'a>(resource: &'a Resource, path: &str) -> Vec<&'a str> {
    evaluate(resource, path)
        .into_iter()
        .filter_map(Value::as_str)
        .collect()
}

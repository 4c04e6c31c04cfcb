//! Resolution of `{{result_key}}` references between steps.
//!
//! A step may publish its output under a `result_key`; later steps reference
//! it with `{{key}}` (the whole captured value) or `{{key.field}}` (one field
//! of a captured object). References must be the entire string value. Flat
//! access only: deeper paths are rejected rather than silently misread.

use std::collections::HashMap;

use serde_json::Value as Json;

use dealflow_core::types::JsonMap;

use crate::error::ExecuteError;

/// Resolve every reference in a values or predicate map.
pub fn resolve_map(
    map: &JsonMap,
    captured: &HashMap<String, Json>,
) -> Result<JsonMap, ExecuteError> {
    let mut out = JsonMap::new();
    for (key, value) in map {
        out.insert(key.clone(), resolve_value(value, captured)?);
    }
    Ok(out)
}

fn resolve_value(value: &Json, captured: &HashMap<String, Json>) -> Result<Json, ExecuteError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(value.clone()),
    };

    match reference_path(s) {
        Some(path) => lookup(s, path, captured),
        None => {
            // Embedded or malformed references are an error, not a literal.
            if s.contains("{{") || s.contains("}}") {
                return Err(ExecuteError::UnresolvedReference(s.to_string()));
            }
            Ok(value.clone())
        }
    }
}

/// Returns the inner path when the whole string is a single `{{...}}`
/// reference, `None` otherwise.
fn reference_path(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    let inner = inner.trim();
    if inner.is_empty() || inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

fn lookup(
    original: &str,
    path: &str,
    captured: &HashMap<String, Json>,
) -> Result<Json, ExecuteError> {
    let mut parts = path.splitn(3, '.');
    let key = parts.next().unwrap_or_default();
    let field = parts.next();
    if parts.next().is_some() {
        return Err(ExecuteError::UnresolvedReference(original.to_string()));
    }

    let value = captured
        .get(key)
        .ok_or_else(|| ExecuteError::UnresolvedReference(original.to_string()))?;

    match field {
        None => Ok(value.clone()),
        Some(field) => value
            .as_object()
            .and_then(|obj| obj.get(field))
            .cloned()
            .ok_or_else(|| ExecuteError::UnresolvedReference(original.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Json) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    fn captured() -> HashMap<String, Json> {
        let mut c = HashMap::new();
        c.insert(
            "new_client".to_string(),
            json!({"id": "c-1", "client_name": "Acme Corp", "contract_value": 5000.0}),
        );
        c.insert("note".to_string(), json!("plain text"));
        c
    }

    #[test]
    fn test_whole_value_reference() {
        let out = resolve_map(&map(json!({"client": "{{new_client}}"})), &captured()).unwrap();
        assert_eq!(out["client"]["id"], "c-1");
    }

    #[test]
    fn test_field_reference() {
        let out = resolve_map(
            &map(json!({"client_id": "{{new_client.id}}", "amount": "{{new_client.contract_value}}"})),
            &captured(),
        )
        .unwrap();
        assert_eq!(out["client_id"], "c-1");
        assert_eq!(out["amount"], 5000.0);
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let out = resolve_map(
            &map(json!({"count": 3, "active": true, "none": null})),
            &captured(),
        )
        .unwrap();
        assert_eq!(out["count"], 3);
        assert_eq!(out["active"], true);
        assert_eq!(out["none"], Json::Null);
    }

    #[test]
    fn test_plain_strings_pass_through() {
        let out = resolve_map(&map(json!({"notes": "call on Monday"})), &captured()).unwrap();
        assert_eq!(out["notes"], "call on Monday");
    }

    #[test]
    fn test_unknown_key_is_unresolved() {
        let err = resolve_map(&map(json!({"x": "{{ghost}}"})), &captured()).unwrap_err();
        assert!(matches!(err, ExecuteError::UnresolvedReference(_)));
        assert!(err.to_string().contains("{{ghost}}"));
    }

    #[test]
    fn test_unknown_field_is_unresolved() {
        let err = resolve_map(&map(json!({"x": "{{new_client.missing}}"})), &captured()).unwrap_err();
        assert!(matches!(err, ExecuteError::UnresolvedReference(_)));
    }

    #[test]
    fn test_field_access_on_non_object_is_unresolved() {
        let err = resolve_map(&map(json!({"x": "{{note.len}}"})), &captured()).unwrap_err();
        assert!(matches!(err, ExecuteError::UnresolvedReference(_)));
    }

    #[test]
    fn test_deep_path_is_rejected() {
        let err = resolve_map(&map(json!({"x": "{{new_client.a.b}}"})), &captured()).unwrap_err();
        assert!(matches!(err, ExecuteError::UnresolvedReference(_)));
    }

    #[test]
    fn test_embedded_reference_is_rejected() {
        let err = resolve_map(
            &map(json!({"subject": "Re: {{new_client.client_name}}"})),
            &captured(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecuteError::UnresolvedReference(_)));
    }

    #[test]
    fn test_whitespace_inside_braces_is_tolerated() {
        let out = resolve_map(&map(json!({"x": "{{ new_client.id }}"})), &captured()).unwrap();
        assert_eq!(out["x"], "c-1");
    }
}

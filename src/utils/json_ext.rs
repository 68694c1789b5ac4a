//! JSON access utilities for the podweave graph engine.
//!
//! Bindings address node outputs with dotted paths (`"extract.results.0"`),
//! and activation conditions branch on loosely typed values, so both path
//! traversal and truthiness live here.

use serde_json::Value;

/// Walks `root` down a sequence of path segments.
///
/// Each segment is either an object key or, when it parses as an index, an
/// array position. Returns `None` as soon as a segment does not resolve.
///
/// # Examples
///
/// ```rust
/// use podweave::utils::json_ext::value_at_path;
/// use serde_json::json;
///
/// let v = json!({"results": [{"url": "https://example.com"}]});
/// let segs = ["results".to_string(), "0".to_string(), "url".to_string()];
/// assert_eq!(value_at_path(&v, &segs), Some(&json!("https://example.com")));
/// assert_eq!(value_at_path(&v, &["missing".to_string()]), None);
/// ```
pub fn value_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for seg in path {
        current = match current {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => {
                let idx: usize = seg.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Loose truthiness used by `if`/`unless` activation gates.
///
/// `null`, `false`, `0`, `""`, `[]`, and `{}` are falsy; everything else is
/// truthy. Gate inputs are typically booleans or absent values, but the
/// loose rule lets a gate reference a collection directly.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn path_resolves_nested_objects_and_arrays() {
        let v = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(value_at_path(&v, &segs(&["a", "b", "0"])), Some(&json!(10)));
        assert_eq!(
            value_at_path(&v, &segs(&["a", "b", "1", "c"])),
            Some(&json!("x"))
        );
    }

    #[test]
    fn path_misses_return_none() {
        let v = json!({"a": [1]});
        assert_eq!(value_at_path(&v, &segs(&["a", "5"])), None);
        assert_eq!(value_at_path(&v, &segs(&["a", "not_an_index"])), None);
        assert_eq!(value_at_path(&v, &segs(&["b"])), None);
        // Scalars cannot be descended into.
        assert_eq!(value_at_path(&json!(3), &segs(&["x"])), None);
    }

    #[test]
    fn empty_path_is_identity() {
        let v = json!({"k": 1});
        assert_eq!(value_at_path(&v, &[]), Some(&v));
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([0])));
        assert!(is_truthy(&json!({"k": null})));
    }
}

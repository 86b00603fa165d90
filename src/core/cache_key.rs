//! Deterministic cache keys.
//!
//! A key is the first 128 bits of SHA256("{operation}:{canonical params}"),
//! hex encoded. Object keys are sorted recursively before hashing, so the
//! insertion order of parameters never changes the key.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of a cache key in hex characters (128 bits)
pub const KEY_LEN: usize = 32;

/// Derive the cache key for an operation and its parameters
pub fn cache_key(operation: &str, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(params).as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..KEY_LEN / 2])
}

/// Serialize a JSON value with every object's keys in sorted order
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Short form of a key for log lines
pub fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_stable() {
        let params = json!({"q": "music", "max": 50});
        assert_eq!(cache_key("search", &params), cache_key("search", &params));
        assert_eq!(cache_key("search", &params).len(), KEY_LEN);
    }

    #[test]
    fn test_key_ignores_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("q".into(), json!("music"));
        a.insert("max".into(), json!(50));
        a.insert("nested".into(), json!({"b": 1, "a": 2}));

        let mut b = serde_json::Map::new();
        b.insert("nested".into(), json!({"a": 2, "b": 1}));
        b.insert("max".into(), json!(50));
        b.insert("q".into(), json!("music"));

        assert_eq!(
            cache_key("search", &Value::Object(a)),
            cache_key("search", &Value::Object(b))
        );
    }

    #[test]
    fn test_key_changes_with_any_input() {
        let base = cache_key("search", &json!({"q": "music", "max": 50}));
        assert_ne!(base, cache_key("search", &json!({"q": "music", "max": 49})));
        assert_ne!(base, cache_key("search", &json!({"q": "Music", "max": 50})));
        assert_ne!(base, cache_key("videos", &json!({"q": "music", "max": 50})));
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            cache_key("videos", &json!({"ids": ["a", "b"]})),
            cache_key("videos", &json!({"ids": ["b", "a"]}))
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        assert_eq!(canonical_json(&json!({"b": 1, "a": [{"d": 0, "c": 1}]})), r#"{"a":[{"c":1,"d":0}],"b":1}"#);
        assert_eq!(canonical_json(&Value::Null), "null");
    }

    #[test]
    fn test_short_key() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}

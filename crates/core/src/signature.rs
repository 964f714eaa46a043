//! Canonical hash fingerprint of a tool invocation, used both as the
//! tool-cache key and to prove two `(tool, args)` pairs are equivalent
//! regardless of object-key order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonicalizes a JSON value by recursively sorting object keys.
/// Arrays keep their order: element order is semantically meaningful
/// for tool arguments (e.g. `product_ids`), key order never is.
pub fn stable_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).unwrap());
                    out.push(':');
                    write(&map[*k], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Computes `sha256(namespace || "::" || tool || stableJSON(args))`, hex-encoded,
/// and returns `<tool>:<hex>`.
pub fn signature(namespace: Option<&str>, tool: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    if let Some(ns) = namespace {
        hasher.update(ns.as_bytes());
        hasher.update(b"::");
    }
    hasher.update(tool.as_bytes());
    hasher.update(stable_json(args).as_bytes());
    let digest = hasher.finalize();
    format!("{tool}:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_signature() {
        let a = json!({"limit": 10, "metric": "sales"});
        let b = json!({"metric": "sales", "limit": 10});
        assert_eq!(
            signature(None, "top_products", &a),
            signature(None, "top_products", &b)
        );
    }

    #[test]
    fn different_args_yield_different_signatures() {
        let a = json!({"metric": "sales"});
        let b = json!({"metric": "units"});
        assert_ne!(
            signature(None, "top_products", &a),
            signature(None, "top_products", &b)
        );
    }

    #[test]
    fn namespace_changes_signature() {
        let args = json!({"metric": "sales"});
        assert_ne!(
            signature(Some("tool_cache"), "top_products", &args),
            signature(None, "top_products", &args)
        );
    }

    #[test]
    fn nested_object_key_order_is_irrelevant() {
        let a = json!({"points": [{"b": 1, "a": 2}]});
        let b = json!({"points": [{"a": 2, "b": 1}]});
        assert_eq!(
            signature(None, "compute_changes", &a),
            signature(None, "compute_changes", &b)
        );
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!({"product_ids": [1, 2]});
        let b = json!({"product_ids": [2, 1]});
        assert_ne!(
            signature(None, "timeseries", &a),
            signature(None, "timeseries", &b)
        );
    }
}

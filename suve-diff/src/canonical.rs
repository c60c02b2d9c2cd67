use std::collections::BTreeMap;

/// Re-serialize `raw` with sorted object keys and two-space indent so two
/// JSON documents that differ only in key order or whitespace compare
/// equal. Returns `None` when `raw` doesn't parse as JSON — the caller
/// then falls back to literal string comparison.
pub fn canonicalize_json(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let sorted = sort_keys(value);
    serde_json::to_string_pretty(&sorted).ok()
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Compare two optional values for equality, canonicalizing both sides as
/// JSON first when `json` is requested and both parse successfully.
pub fn values_equal(a: &str, b: &str, json: bool) -> bool {
    if json {
        if let (Some(ca), Some(cb)) = (canonicalize_json(a), canonicalize_json(b)) {
            return ca == cb;
        }
    }
    a == b
}

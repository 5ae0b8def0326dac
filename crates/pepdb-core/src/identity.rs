//! Sample identity: content digests and row GUIDs.
//!
//! The digest is MD5 over a canonical JSON rendering of the sample rows:
//! object keys sorted at every depth, compact `,`/`:` separators, non-ASCII
//! left unescaped. Two sample tables with the same rows in the same order
//! digest identically no matter how their keys are ordered in memory.

use crate::models::SampleAttributes;
use serde_json::Value;

/// Compute the content digest of an ordered sample table.
pub fn compute_digest(rows: &[SampleAttributes]) -> String {
    let mut buf = String::new();
    buf.push('[');
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write_canonical_object(row, &mut buf);
    }
    buf.push(']');

    hex::encode(md5::compute(buf.as_bytes()).0)
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, buf),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        // Scalars: serde_json's compact form is already canonical.
        scalar => buf.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &serde_json::Map<String, Value>, buf: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push_str(&Value::String(key.clone()).to_string());
        buf.push(':');
        write_canonical(value, buf);
    }
    buf.push('}');
}

/// Mint a GUID for a sample row that has none.
pub fn assign_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize a GUID carried on an incoming row.
///
/// `null`, empty strings and non-string values other than numbers mean
/// "no identifier". Numbers are accepted in their decimal form.
pub fn guid_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn row(value: Value) -> SampleAttributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = vec![
            row(json!({"sample_name": "a", "protocol": "rna", "nested": {"x": 1, "y": 2}})),
            row(json!({"sample_name": "b", "protocol": "dna"})),
        ];
        let b = vec![
            row(json!({"nested": {"y": 2, "x": 1}, "protocol": "rna", "sample_name": "a"})),
            row(json!({"protocol": "dna", "sample_name": "b"})),
        ];
        assert_eq!(compute_digest(&a), compute_digest(&b));
    }

    #[test]
    fn test_digest_detects_content_count_and_order_changes() {
        let base = vec![
            row(json!({"sample_name": "a"})),
            row(json!({"sample_name": "b"})),
        ];
        let digest = compute_digest(&base);

        let mut changed = base.clone();
        changed[1].insert("sample_name".into(), json!("c"));
        assert_ne!(digest, compute_digest(&changed));

        let mut added = base.clone();
        added.push(row(json!({"sample_name": "c"})));
        assert_ne!(digest, compute_digest(&added));

        let reordered = vec![base[1].clone(), base[0].clone()];
        assert_ne!(digest, compute_digest(&reordered));

        assert_ne!(digest, compute_digest(&base[..1]));
    }

    #[test]
    fn test_digest_uses_sorted_compact_json() {
        let md5_hex = |text: &str| hex::encode(md5::compute(text.as_bytes()).0);

        let rows = vec![row(json!({"b": "2", "a": [1, {"z": null, "y": true}]}))];
        assert_eq!(
            compute_digest(&rows),
            md5_hex(r#"[{"a":[1,{"y":true,"z":null}],"b":"2"}]"#)
        );
        assert_eq!(compute_digest(&[]), md5_hex("[]"));
    }

    #[test]
    fn test_digest_keeps_unicode_unescaped() {
        let rows = vec![row(json!({"k": "ß"}))];
        assert_eq!(
            compute_digest(&rows),
            hex::encode(md5::compute("[{\"k\":\"ß\"}]".as_bytes()).0)
        );
    }

    #[test]
    fn test_assign_guid_is_unique() {
        let guids: HashSet<String> = (0..1000).map(|_| assign_guid()).collect();
        assert_eq!(guids.len(), 1000);
    }

    #[test]
    fn test_guid_from_value() {
        assert_eq!(guid_from_value(&json!("abc")), Some("abc".to_string()));
        assert_eq!(guid_from_value(&json!(12)), Some("12".to_string()));
        assert_eq!(guid_from_value(&json!("")), None);
        assert_eq!(guid_from_value(&Value::Null), None);
        assert_eq!(guid_from_value(&json!({"a": 1})), None);
    }
}

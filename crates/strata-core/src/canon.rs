//! Deterministic text and JSON canonicalization, and the hashes built on it.
//!
//! Cosmetic differences (Unicode composition form, surrounding or repeated
//! whitespace, key order, operation order) never change a checksum.

use std::cmp::Ordering;

use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::ProposalError;
use crate::types::Operation;

/// NFC-compose, trim, and collapse internal whitespace runs to one space.
pub fn normalize_text(s: &str) -> String {
    let composed: String = s.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply [`normalize_text`] to every string value nested in `value`.
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Serialize with sorted keys and no incidental whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of the normalized form of `text`.
pub fn hash_text(text: &str) -> String {
    hash_sha256(normalize_text(text).as_bytes())
}

/// Hash of the canonical JSON of `value`.
pub fn hash_json(value: &Value) -> String {
    hash_sha256(canonical_json(value).as_bytes())
}

/// Order-independent checksum of an operation list.
///
/// Operations are normalized, then sorted by `(op_type, target_id | temp_id | op_id)`
/// with their canonical JSON as the final tiebreak, so any permutation of the
/// same list hashes identically.
pub fn checksum(operations: &[Operation]) -> Result<String, ProposalError> {
    let mut keyed = Vec::with_capacity(operations.len());
    for op in operations {
        let value = serde_json::to_value(op)
            .map_err(|e| ProposalError::Serialization(e.to_string()))?;
        let normalized = normalize_value(&value);
        let sort_key = op
            .target_id
            .as_deref()
            .or(op.temp_id.as_deref())
            .unwrap_or(&op.op_id);
        keyed.push((
            op.op_type.as_str(),
            normalize_text(sort_key),
            canonical_json(&normalized),
            normalized,
        ));
    }

    keyed.sort_by(|a, b| match a.0.cmp(b.0) {
        Ordering::Equal => a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)),
        other => other,
    });

    let list = Value::Array(keyed.into_iter().map(|(_, _, _, v)| v).collect());
    Ok(hash_json(&list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Evidence, OpType};
    use serde_json::json;

    fn skill_op(title: &str) -> Operation {
        Operation::node("o1", OpType::CreateNode, "Skill", "S1")
            .with_prop("title", title)
            .with_evidence(Evidence::new("chunk-1", "Skills are built on concepts"))
    }

    fn concept_op() -> Operation {
        Operation::node("o2", OpType::CreateNode, "Concept", "C1")
            .with_evidence(Evidence::new("chunk-1", "A concept"))
    }

    #[test]
    fn normalize_text_collapses_and_composes() {
        assert_eq!(normalize_text("  a \t b\n\nc  "), "a b c");
        // "e" + combining acute composes to a single code point.
        assert_eq!(normalize_text("caf\u{0065}\u{0301}"), "caf\u{00e9}");
    }

    #[test]
    fn canonical_json_sorts_keys_without_spaces() {
        let v = json!({"b": 1, "a": {"z": [1, 2], "y": null}});
        assert_eq!(canonical_json(&v), r#"{"a":{"y":null,"z":[1,2]},"b":1}"#);
    }

    #[test]
    fn canonical_json_escapes_strings() {
        let v = json!({"q": "say \"hi\""});
        assert_eq!(canonical_json(&v), r#"{"q":"say \"hi\""}"#);
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_text("  abc "), hash_sha256(b"abc"));
    }

    #[test]
    fn checksum_is_order_independent() {
        let a = checksum(&[skill_op("Add"), concept_op()]).unwrap();
        let b = checksum(&[concept_op(), skill_op("Add")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_ignores_whitespace_and_unicode_form() {
        let a = checksum(&[skill_op("Caf\u{00e9}  au lait")]).unwrap();
        let b = checksum(&[skill_op("  Cafe\u{0301} au\tlait ")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_changes_with_content() {
        let a = checksum(&[skill_op("Add")]).unwrap();
        let b = checksum(&[skill_op("Subtract")]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn checksum_stable_for_same_target_ties() {
        let u1 = Operation::new("u1", OpType::UpdateNode)
            .with_target("T1")
            .with_prop("title", "one");
        let u2 = Operation::new("u2", OpType::UpdateNode)
            .with_target("T1")
            .with_prop("title", "two");
        assert_eq!(
            checksum(&[u1.clone(), u2.clone()]).unwrap(),
            checksum(&[u2, u1]).unwrap()
        );
    }
}

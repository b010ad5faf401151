//! Canonical Vector
//!
//! Ordered, schema-keyed, deterministic representation of a signal set.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Normalized value of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CanonicalValue {
    /// Absent, explicitly null, or failed normalization
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Canonical JSON text of a list or record
    Composite(String),
}

impl CanonicalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    /// One-byte type tag used in the canonical serialization
    pub fn tag(&self) -> char {
        match self {
            CanonicalValue::Null => 'N',
            CanonicalValue::Text(_) => 's',
            CanonicalValue::Number(_) => 'n',
            CanonicalValue::Bool(_) => 'b',
            CanonicalValue::Composite(_) => 'c',
        }
    }

    /// Payload text, `None` for the null marker
    pub fn payload(&self) -> Option<String> {
        match self {
            CanonicalValue::Null => None,
            CanonicalValue::Text(s) => Some(s.clone()),
            // f64 Display is the shortest string that round-trips
            CanonicalValue::Number(n) => Some(n.to_string()),
            CanonicalValue::Bool(b) => Some(b.to_string()),
            CanonicalValue::Composite(s) => Some(s.clone()),
        }
    }

    /// Tag + payload; input of the per-feature content hash
    pub fn tagged_payload(&self) -> Option<String> {
        self.payload().map(|p| format!("{}{}", self.tag(), p))
    }
}

/// (key, value) pair in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub key: String,
    pub value: CanonicalValue,
}

/// Versioned canonical vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalVector {
    /// Schema version the vector was built with
    pub schema_version: u8,
    /// CRC32 of the key list the vector was built with
    pub layout_hash: u32,
    /// Entries in schema order
    pub entries: Vec<CanonicalEntry>,
}

impl CanonicalVector {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalEntry> {
        self.entries.iter()
    }

    /// Keys whose value is not the null marker
    pub fn present_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.value.is_null())
            .map(|e| e.key.as_str())
    }

    pub fn present_count(&self) -> usize {
        self.present_keys().count()
    }

    /// Length-prefixed canonical serialization
    ///
    /// Header `v<version>:<layout hash>;` followed by one record per entry:
    /// `<len(key)>:<key><tag>[<len(payload)>:<payload>];`
    /// Lengths are byte counts, so no payload content can forge a boundary.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 48);
        let _ = write!(out, "v{}:{:08x};", self.schema_version, self.layout_hash);

        for entry in &self.entries {
            let _ = write!(out, "{}:{}{}", entry.key.len(), entry.key, entry.value.tag());
            if let Some(payload) = entry.value.payload() {
                let _ = write!(out, "{}:{}", payload.len(), payload);
            }
            out.push(';');
        }

        out
    }

    /// CRC32 of the serialization, for log correlation only
    pub fn debug_checksum(&self) -> u32 {
        crc32fast::hash(self.serialize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(entries: Vec<(&str, CanonicalValue)>) -> CanonicalVector {
        CanonicalVector {
            schema_version: 1,
            layout_hash: 0xabcd,
            entries: entries
                .into_iter()
                .map(|(key, value)| CanonicalEntry { key: key.to_string(), value })
                .collect(),
        }
    }

    #[test]
    fn test_serialize_format() {
        let v = vector(vec![
            ("a", CanonicalValue::Text("x y".into())),
            ("b", CanonicalValue::Null),
            ("c", CanonicalValue::Number(1.5)),
        ]);
        assert_eq!(v.serialize(), "v1:0000abcd;1:as3:x y;1:bN;1:cn3:1.5;");
    }

    #[test]
    fn test_null_distinct_from_empty() {
        let null = vector(vec![("a", CanonicalValue::Null)]);
        let empty = vector(vec![("a", CanonicalValue::Text(String::new()))]);
        assert_ne!(null.serialize(), empty.serialize());
    }

    #[test]
    fn test_separator_inside_value_is_unambiguous() {
        // One field containing what looks like a second entry
        let forged = vector(vec![("a", CanonicalValue::Text("1;1:bs1:x".into()))]);
        let honest = vector(vec![
            ("a", CanonicalValue::Text("1".into())),
            ("b", CanonicalValue::Text("x".into())),
        ]);
        assert_ne!(forged.serialize(), honest.serialize());
    }

    #[test]
    fn test_type_tag_distinguishes_values() {
        let text = vector(vec![("a", CanonicalValue::Text("true".into()))]);
        let boolean = vector(vec![("a", CanonicalValue::Bool(true))]);
        assert_ne!(text.serialize(), boolean.serialize());
    }

    #[test]
    fn test_present_keys() {
        let v = vector(vec![
            ("a", CanonicalValue::Bool(false)),
            ("b", CanonicalValue::Null),
        ]);
        assert_eq!(v.present_keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(v.present_count(), 1);
    }
}

//! Directory entries
//!
//! An `Entry` is a client-side handle: a cached attribute map plus the
//! modifications queued since the last commit. Attribute names are matched
//! case-insensitively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value; text values holding a number are accepted too
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            AttributeValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Assertion-style comparison against a filter string
    pub fn matches_text(&self, expected: &str) -> bool {
        match self {
            AttributeValue::Text(s) => s.eq_ignore_ascii_case(expected),
            AttributeValue::Int(i) => expected.trim().parse::<i64>().map_or(false, |e| e == *i),
            AttributeValue::Bool(b) => {
                expected.eq_ignore_ascii_case(if *b { "TRUE" } else { "FALSE" })
            }
            AttributeValue::Binary(_) => false,
        }
    }

    /// Value equality with case-insensitive text
    pub fn same_as(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::Binary(b)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// A queued attribute change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modification {
    Replace { name: String, values: Vec<AttributeValue> },
    Add { name: String, value: AttributeValue },
    Remove { name: String, value: AttributeValue },
    Clear { name: String },
}

impl Modification {
    /// Attribute the change applies to
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Replace { name, .. }
            | Modification::Add { name, .. }
            | Modification::Remove { name, .. }
            | Modification::Clear { name } => name,
        }
    }

    /// Apply to an attribute map keyed by lowercase name.
    pub fn apply_to(&self, attributes: &mut BTreeMap<String, Vec<AttributeValue>>) {
        let key = self.attribute().to_ascii_lowercase();
        match self {
            Modification::Replace { values, .. } => {
                if values.is_empty() {
                    attributes.remove(&key);
                } else {
                    attributes.insert(key, values.clone());
                }
            }
            Modification::Add { value, .. } => {
                let current = attributes.entry(key).or_default();
                if !current.iter().any(|v| v.same_as(value)) {
                    current.push(value.clone());
                }
            }
            Modification::Remove { value, .. } => {
                if let Some(current) = attributes.get_mut(&key) {
                    current.retain(|v| !v.same_as(value));
                    if current.is_empty() {
                        attributes.remove(&key);
                    }
                }
            }
            Modification::Clear { .. } => {
                attributes.remove(&key);
            }
        }
    }
}

/// Client-side handle on a directory object
#[derive(Debug, Clone)]
pub struct Entry {
    server: String,
    dn: String,
    object_class: String,
    is_new: bool,
    attributes: BTreeMap<String, Vec<AttributeValue>>,
    pending: Vec<Modification>,
}

impl Entry {
    /// A not-yet-created object
    pub fn provisional(server: impl Into<String>, dn: impl Into<String>, object_class: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            dn: dn.into(),
            object_class: object_class.into(),
            is_new: true,
            attributes: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// An object read from `server`
    pub fn bound(
        server: impl Into<String>,
        dn: impl Into<String>,
        object_class: impl Into<String>,
        attributes: BTreeMap<String, Vec<AttributeValue>>,
    ) -> Self {
        Self {
            server: server.into(),
            dn: dn.into(),
            object_class: object_class.into(),
            is_new: false,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            pending: Vec::new(),
        }
    }

    /// Server the handle is bound to
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn object_class(&self) -> &str {
        &self.object_class
    }

    /// True until the first successful commit
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    // ==================
    // Reads
    // ==================

    pub fn values(&self, name: &str) -> &[AttributeValue] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.values(name).first()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(AttributeValue::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.first(name).and_then(AttributeValue::as_int)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.first(name).and_then(AttributeValue::as_bool)
    }

    /// All text values of a multi-valued attribute
    pub fn texts(&self, name: &str) -> Vec<&str> {
        self.values(name).iter().filter_map(AttributeValue::as_text).collect()
    }

    /// Cached attributes, keyed by lowercase name
    pub fn attributes(&self) -> &BTreeMap<String, Vec<AttributeValue>> {
        &self.attributes
    }

    // ==================
    // Buffered writes
    // ==================

    /// Replace all values. An empty list clears the attribute.
    pub fn replace(&mut self, name: &str, values: Vec<AttributeValue>) {
        let m = if values.is_empty() {
            Modification::Clear { name: name.to_string() }
        } else {
            Modification::Replace { name: name.to_string(), values }
        };
        self.push(m);
    }

    pub fn add_value(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.push(Modification::Add {
            name: name.to_string(),
            value: value.into(),
        });
    }

    pub fn remove_value(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.push(Modification::Remove {
            name: name.to_string(),
            value: value.into(),
        });
    }

    pub fn clear(&mut self, name: &str) {
        self.push(Modification::Clear { name: name.to_string() });
    }

    /// Queue a modification and apply it to the cache.
    pub fn push(&mut self, modification: Modification) {
        modification.apply_to(&mut self.attributes);
        self.pending.push(modification);
    }

    pub fn pending(&self) -> &[Modification] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    // ==================
    // Store-side hooks
    // ==================

    /// Record a successful commit.
    pub fn mark_committed(&mut self) {
        self.is_new = false;
        self.pending.clear();
    }

    /// Replace the cache with server state, dropping queued changes.
    pub fn reload(&mut self, object_class: impl Into<String>, attributes: BTreeMap<String, Vec<AttributeValue>>) {
        self.object_class = object_class.into();
        self.attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self.pending.clear();
        self.is_new = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_names() {
        let mut entry = Entry::provisional("dc1", "CN=x", "container");
        entry.replace("dnsRoot", vec!["dc1.corp.com".into()]);
        assert_eq!(entry.text("DNSROOT"), Some("dc1.corp.com"));
        assert_eq!(entry.pending().len(), 1);
    }

    #[test]
    fn test_add_remove_clear() {
        let mut entry = Entry::provisional("dc1", "CN=x", "crossRef");
        entry.add_value("locations", "A");
        entry.add_value("locations", "a");
        entry.add_value("locations", "B");
        assert_eq!(entry.texts("locations"), vec!["A", "B"]);

        entry.remove_value("locations", "A");
        assert_eq!(entry.texts("locations"), vec!["B"]);

        entry.clear("locations");
        assert!(!entry.contains("locations"));
        assert_eq!(entry.pending().len(), 5);
    }

    #[test]
    fn test_empty_replace_is_clear() {
        let mut entry = Entry::provisional("dc1", "CN=x", "crossRef");
        entry.replace("cost", vec![]);
        assert!(matches!(entry.pending()[0], Modification::Clear { .. }));
    }

    #[test]
    fn test_mark_committed_clears_pending() {
        let mut entry = Entry::provisional("dc1", "CN=x", "crossRef");
        entry.replace("cost", vec![100i64.into()]);
        entry.mark_committed();
        assert!(!entry.is_new());
        assert!(!entry.has_pending());
        assert_eq!(entry.int("cost"), Some(100));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(AttributeValue::from("42").as_int(), Some(42));
        assert_eq!(AttributeValue::from("TRUE").as_bool(), Some(true));
        assert!(AttributeValue::from(5i64).matches_text("5"));
        assert!(AttributeValue::from(false).matches_text("false"));
    }

    #[test]
    fn test_binary_serializes_as_base64() {
        let value = AttributeValue::Binary(vec![0, 1, 2, 255]);
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("AAEC/w=="));
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}

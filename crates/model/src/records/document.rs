use crate::core::value::Value;
use serde::{Serialize, Serializer, ser::SerializeMap};

/// Raw engine output before conversion into a [`Document`].
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Fixed cost charged per document on top of its fields.
const DOCUMENT_OVERHEAD: usize = 16;

/// Immutable, ordered field -> value mapping handed to pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Placeholder emitted when no downstream stage needs field data.
    pub fn empty() -> Self {
        Self::new()
    }

    /// Converts the whole raw record, keeping its field order.
    pub fn from_raw(raw: &RawRecord) -> Self {
        Document {
            fields: raw
                .iter()
                .map(|(name, value)| (name.clone(), Value::from(value)))
                .collect(),
        }
    }

    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut doc = Document::new();
        for (name, value) in fields {
            doc.insert(name, value);
        }
        doc
    }

    /// Sets `name`, replacing an existing field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        DOCUMENT_OVERHEAD
            + self
                .fields
                .iter()
                .map(|(name, value)| name.len() + value.size_bytes())
                .sum::<usize>()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_raw_preserves_order() {
        let doc = Document::from_raw(&raw(json!({"b": 1, "a": {"c": "x"}})));
        let names: Vec<&str> = doc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        let nested = doc.get("a").and_then(|v| v.as_document()).unwrap();
        assert_eq!(nested.get("c"), Some(&Value::from("x")));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut doc = Document::from_fields([("a", 1i64), ("b", 2i64)]);
        doc.insert("a", 10i64);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("a"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_serializes_as_object() {
        let doc = Document::from_fields([("x", Value::from("y"))]);
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({"x": "y"}));
        assert_eq!(doc.to_json(), json!({"x": "y"}));
    }

    #[test]
    fn test_empty_placeholder_has_no_fields() {
        let doc = Document::empty();
        assert!(doc.is_empty());
        assert_eq!(doc.to_json(), json!({}));
    }
}

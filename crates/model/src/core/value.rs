use crate::records::document::Document;
use serde::Serialize;
use std::fmt;

/// Per-value bookkeeping overhead used by the size estimate.
const VALUE_OVERHEAD: usize = std::mem::size_of::<u64>();

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Rough in-memory footprint, used for batch byte accounting.
    pub fn size_bytes(&self) -> usize {
        VALUE_OVERHEAD
            + match self {
                Value::Null | Value::Boolean(_) => 0,
                Value::Int(_) => std::mem::size_of::<i64>(),
                Value::Double(_) => std::mem::size_of::<f64>(),
                Value::String(s) => s.len(),
                Value::Array(items) => items.iter().map(Value::size_bytes).sum(),
                Value::Document(doc) => doc.size_bytes(),
            }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Document(doc) => doc.to_json(),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(Document::from_raw(map)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_integers_integral() {
        assert_eq!(Value::from(&json!(7)), Value::Int(7));
        assert_eq!(Value::from(&json!(7.5)), Value::Double(7.5));
        assert_eq!(Value::from(&json!(null)), Value::Null);
    }

    #[test]
    fn test_size_grows_with_content() {
        let short = Value::from("ab");
        let long = Value::from("abcdefgh");
        assert!(long.size_bytes() > short.size_bytes());
    }
}

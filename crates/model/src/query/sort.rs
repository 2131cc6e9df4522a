use serde::{Serialize, Serializer, ser::SerializeMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Ordered list of `(field, direction)` keys, e.g. `{a: 1, b: -1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortPattern {
    keys: Vec<(String, SortDirection)>,
}

impl SortPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.keys
                .iter()
                .map(|(field, dir)| (field.clone(), serde_json::Value::from(dir.as_i32())))
                .collect(),
        )
    }
}

impl Serialize for SortPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for (field, dir) in &self.keys {
            map.serialize_entry(field, &dir.as_i32())?;
        }
        map.end()
    }
}

impl fmt::Display for SortPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

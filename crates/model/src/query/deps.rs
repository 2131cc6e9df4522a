use crate::{
    core::value::Value,
    records::document::{Document, RawRecord},
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum DepNode {
    /// The whole field is needed.
    Whole,
    /// Only the listed subfields are needed.
    Sub(BTreeMap<String, DepNode>),
}

/// Field dependencies of the downstream pipeline, in a form that can cheaply
/// pull just those fields out of a raw record.
///
/// The set itself comes from dependency analysis elsewhere; this type only
/// consumes the resulting field paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedDeps {
    fields: BTreeMap<String, DepNode>,
}

impl ParsedDeps {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut deps = ParsedDeps::default();
        for path in paths {
            deps.add_path(path.as_ref());
        }
        deps
    }

    fn add_path(&mut self, path: &str) {
        let mut level = &mut self.fields;
        let mut parts = path.split('.').filter(|p| !p.is_empty()).peekable();

        while let Some(part) = parts.next() {
            let is_last = parts.peek().is_none();
            let node = level
                .entry(part.to_string())
                .or_insert_with(|| DepNode::Sub(BTreeMap::new()));

            if is_last {
                *node = DepNode::Whole;
                return;
            }

            match node {
                // A parent that is needed whole already covers this path.
                DepNode::Whole => return,
                DepNode::Sub(children) => level = children,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Top-level paths in sorted order, for explain output.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.fields, "", &mut out);
        out
    }

    /// Builds a document holding only the dependency fields of `raw`, in the
    /// raw record's field order.
    pub fn extract_fields(&self, raw: &RawRecord) -> Document {
        extract_level(&self.fields, raw)
    }
}

fn collect_paths(level: &BTreeMap<String, DepNode>, prefix: &str, out: &mut Vec<String>) {
    for (name, node) in level {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match node {
            DepNode::Whole => out.push(path),
            DepNode::Sub(children) => collect_paths(children, &path, out),
        }
    }
}

fn extract_level(level: &BTreeMap<String, DepNode>, raw: &RawRecord) -> Document {
    let mut doc = Document::new();
    for (name, value) in raw {
        let Some(node) = level.get(name) else {
            continue;
        };
        match node {
            DepNode::Whole => doc.insert(name.clone(), Value::from(value)),
            DepNode::Sub(children) => {
                if let Some(sub) = extract_nested(children, value) {
                    doc.insert(name.clone(), sub);
                }
            }
        }
    }
    doc
}

fn extract_nested(children: &BTreeMap<String, DepNode>, value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Object(map) => Some(Value::Document(extract_level(children, map))),
        // Subfield paths traverse arrays; scalars inside them carry no subfields.
        serde_json::Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| extract_nested(children, item))
                .collect(),
        )),
        _ => None,
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
    fn test_extracts_top_level_fields_in_record_order() {
        let deps = ParsedDeps::new(["c", "a"]);
        let doc = deps.extract_fields(&raw(json!({"a": 1, "b": 2, "c": 3})));
        assert_eq!(doc.to_json(), json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_extracts_nested_paths() {
        let deps = ParsedDeps::new(["a.b"]);
        let doc = deps.extract_fields(&raw(json!({"a": {"b": 1, "c": 2}, "d": 4})));
        assert_eq!(doc.to_json(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_nested_path_traverses_arrays() {
        let deps = ParsedDeps::new(["a.b"]);
        let doc = deps.extract_fields(&raw(json!({"a": [{"b": 1, "x": 0}, 5, {"c": 2}]})));
        assert_eq!(doc.to_json(), json!({"a": [{"b": 1}, {}]}));
    }

    #[test]
    fn test_parent_path_wins_over_child() {
        let deps = ParsedDeps::new(["a.b", "a"]);
        assert_eq!(deps.paths(), vec!["a".to_string()]);

        let deps = ParsedDeps::new(["a", "a.b"]);
        assert_eq!(deps.paths(), vec!["a".to_string()]);
    }

    #[test]
    fn test_missing_and_scalar_parents_are_skipped() {
        let deps = ParsedDeps::new(["a.b", "z"]);
        let doc = deps.extract_fields(&raw(json!({"a": 3})));
        assert!(doc.is_empty());
    }
}

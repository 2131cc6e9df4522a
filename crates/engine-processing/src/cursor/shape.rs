use model::query::deps::ParsedDeps;
use serde_json::{Map, Value};

/// Query, sort and projection actually pushed down to the engine, captured
/// once optimization has finished. Frozen on [`QueryShapeBuilder::build`].
///
/// The dependency set is owned alongside the payloads it was derived from, so
/// it can never outlive them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryShape {
    query: Option<Value>,
    sort: Option<Value>,
    projection: Option<Value>,
    dependencies: Option<ParsedDeps>,
}

impl QueryShape {
    pub fn builder() -> QueryShapeBuilder {
        QueryShapeBuilder::default()
    }

    pub fn query(&self) -> Option<&Value> {
        self.query.as_ref()
    }

    pub fn sort(&self) -> Option<&Value> {
        self.sort.as_ref()
    }

    pub fn projection(&self) -> Option<&Value> {
        self.projection.as_ref()
    }

    pub fn dependencies(&self) -> Option<&ParsedDeps> {
        self.dependencies.as_ref()
    }

    /// Explain fields: `query`, `sort` and `fields`, each only when present.
    pub(crate) fn explain_fields(&self, out: &mut Map<String, Value>) {
        if let Some(query) = &self.query {
            out.insert("query".to_string(), query.clone());
        }
        if let Some(sort) = &self.sort {
            out.insert("sort".to_string(), sort.clone());
        }
        if let Some(projection) = &self.projection {
            out.insert("fields".to_string(), projection.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryShapeBuilder {
    shape: QueryShape,
}

impl QueryShapeBuilder {
    pub fn query(mut self, query: Value) -> Self {
        self.shape.query = Some(query);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.shape.sort = Some(sort);
        self
    }

    /// `deps` is the result of dependency analysis over the rest of the
    /// pipeline; `None` means downstream needs whole documents.
    pub fn projection(mut self, projection: Value, deps: Option<ParsedDeps>) -> Self {
        self.shape.projection = Some(projection);
        self.shape.dependencies = deps;
        self
    }

    pub fn build(self) -> QueryShape {
        self.shape
    }
}

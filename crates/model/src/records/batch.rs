use crate::records::document::Document;
use std::collections::VecDeque;

/// FIFO buffer of converted documents.
///
/// A batch is filled in bulk by a loader and drained one document at a time;
/// it is only refilled once it has been fully drained.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    docs: VecDeque<Document>,
    size_bytes: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: Document) {
        self.size_bytes += doc.size_bytes();
        self.docs.push_back(doc);
    }

    pub fn pop_front(&mut self) -> Option<Document> {
        let doc = self.docs.pop_front()?;
        self.size_bytes = self.size_bytes.saturating_sub(doc.size_bytes());
        Some(doc)
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Approximate bytes currently buffered.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.size_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_size_accounting() {
        let mut batch = Batch::new();
        batch.push(Document::from_fields([("n", 1i64)]));
        batch.push(Document::from_fields([("n", 2i64)]));
        assert_eq!(batch.len(), 2);
        assert!(batch.size_bytes() > 0);

        let first = batch.pop_front().unwrap();
        assert_eq!(first.get("n").and_then(|v| v.as_i64()), Some(1));
        let second = batch.pop_front().unwrap();
        assert_eq!(second.get("n").and_then(|v| v.as_i64()), Some(2));
        assert!(batch.pop_front().is_none());
        assert_eq!(batch.size_bytes(), 0);
    }
}

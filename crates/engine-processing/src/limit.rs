use crate::{
    error::StageError,
    stage::{GetNextResult, Optimization, Stage, Upstream},
};
use async_trait::async_trait;
use model::query::explain::ExplainVerbosity;
use serde_json::json;
use std::{any::Any, num::NonZeroU64};
use tracing::debug;

/// Passes through at most `limit` documents, then disposes its upstream.
#[derive(Debug, Clone)]
pub struct LimitStage {
    limit: u64,
    returned: u64,
}

impl LimitStage {
    pub fn new(limit: NonZeroU64) -> Self {
        LimitStage {
            limit: limit.get(),
            returned: 0,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

#[async_trait]
impl Stage for LimitStage {
    fn source_name(&self) -> &'static str {
        "$limit"
    }

    async fn get_next(&mut self, upstream: &mut Upstream<'_>) -> Result<GetNextResult, StageError> {
        if self.returned >= self.limit {
            upstream.dispose();
            return Ok(GetNextResult::Eof);
        }

        let next = upstream.next().await?;
        if !next.is_eof() {
            self.returned += 1;
        }
        Ok(next)
    }

    fn serialize(&self, _explain: Option<ExplainVerbosity>) -> Option<serde_json::Value> {
        Some(json!({ "$limit": self.limit }))
    }

    /// Coalesces an immediately following limit into this one.
    fn optimize_at(&mut self, next: Option<&dyn Stage>) -> Optimization {
        match next.and_then(|s| s.as_any().downcast_ref::<LimitStage>()) {
            Some(other) => {
                self.limit = self.limit.min(other.limit);
                debug!(limit = self.limit, "Coalesced adjacent $limit stages");
                Optimization::RemoveNext
            }
            None => Optimization::Unchanged,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: u64) -> LimitStage {
        LimitStage::new(NonZeroU64::new(n).unwrap())
    }

    #[test]
    fn test_coalesces_following_limit() {
        let mut first = limit(10);
        let second = limit(4);
        assert_eq!(first.optimize_at(Some(&second)), Optimization::RemoveNext);
        assert_eq!(first.limit(), 4);

        assert_eq!(first.optimize_at(None), Optimization::Unchanged);
    }

    #[tokio::test]
    async fn test_without_upstream_returns_eof() {
        let mut stage = limit(2);
        let mut upstream = Upstream::empty();
        assert!(stage.get_next(&mut upstream).await.unwrap().is_eof());
    }

    #[test]
    fn test_serialize() {
        assert_eq!(limit(3).serialize(None), Some(json!({ "$limit": 3 })));
    }
}

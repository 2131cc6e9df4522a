use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// How much detail an explain request asks for. Ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplainVerbosity {
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

impl ExplainVerbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainVerbosity::QueryPlanner => "queryPlanner",
            ExplainVerbosity::ExecutionStats => "executionStats",
            ExplainVerbosity::AllPlansExecution => "allPlansExecution",
        }
    }

    pub fn includes_stats(&self) -> bool {
        *self >= ExplainVerbosity::ExecutionStats
    }
}

impl fmt::Display for ExplainVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown explain verbosity: {0}")]
pub struct ParseVerbosityError(pub String);

impl FromStr for ExplainVerbosity {
    type Err = ParseVerbosityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queryPlanner" => Ok(ExplainVerbosity::QueryPlanner),
            "executionStats" => Ok(ExplainVerbosity::ExecutionStats),
            "allPlansExecution" => Ok(ExplainVerbosity::AllPlansExecution),
            other => Err(ParseVerbosityError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_ordering() {
        assert!(!ExplainVerbosity::QueryPlanner.includes_stats());
        assert!(ExplainVerbosity::ExecutionStats.includes_stats());
        assert!(ExplainVerbosity::AllPlansExecution.includes_stats());
    }

    #[test]
    fn test_parse_round_trips_names() {
        for v in [
            ExplainVerbosity::QueryPlanner,
            ExplainVerbosity::ExecutionStats,
            ExplainVerbosity::AllPlansExecution,
        ] {
            assert_eq!(v.as_str().parse::<ExplainVerbosity>().unwrap(), v);
        }
        assert!("verbose".parse::<ExplainVerbosity>().is_err());
    }
}

use serde::Deserialize;
use std::env;
use tracing::warn;

pub const ENV_BATCH_MAX_RECORDS: &str = "CURSOR_BATCH_MAX_RECORDS";
pub const ENV_BATCH_SIZE_BYTES: &str = "CURSOR_BATCH_SIZE_BYTES";

/// Batching thresholds for a cursor stage. A batch ends at whichever bound is
/// hit first; neither value changes results, only how often the engine yields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Maximum number of documents per batch
    pub max_batch_records: usize,

    /// Approximate in-memory size after which a batch is closed
    pub batch_size_bytes: usize,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            max_batch_records: 1000,
            batch_size_bytes: 4 * 1024 * 1024,
        }
    }
}

impl CursorConfig {
    /// Defaults overridden by `CURSOR_BATCH_MAX_RECORDS` and
    /// `CURSOR_BATCH_SIZE_BYTES` when set to valid values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(records) = read_env(ENV_BATCH_MAX_RECORDS) {
            config = config.with_max_batch_records(records);
        }
        if let Some(bytes) = read_env(ENV_BATCH_SIZE_BYTES) {
            config = config.with_batch_size_bytes(bytes);
        }
        config
    }

    pub fn with_max_batch_records(mut self, records: usize) -> Self {
        self.max_batch_records = records.max(1);
        self
    }

    pub fn with_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.batch_size_bytes = bytes;
        self
    }
}

fn read_env(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring invalid cursor setting");
            None
        }
    }
}

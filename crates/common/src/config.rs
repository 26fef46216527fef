use serde::{Deserialize, Serialize};

/// Per-rule optimizer toggles.
///
/// All rules default to enabled; a disabled rule still runs through the
/// pipeline and records a `skipped (disabled)` audit entry so `explain()`
/// output stays deterministic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizerToggles {
    /// Skip partitions whose directory-encoded values cannot match.
    pub partition_pruning: bool,
    /// Push simple WHERE conjuncts into scans.
    pub predicate_pushdown: bool,
    /// Attach required-column sets to scans.
    pub column_pruning: bool,
    /// Cap scan row counts under a plain LIMIT pipeline.
    pub limit_pushdown: bool,
}

impl Default for OptimizerToggles {
    fn default() -> Self {
        Self {
            partition_pruning: true,
            predicate_pushdown: true,
            column_pruning: true,
            limit_pushdown: true,
        }
    }
}

impl OptimizerToggles {
    /// All rules disabled; useful for verifying pushdown preserves semantics.
    pub fn disabled() -> Self {
        Self {
            partition_pruning: false,
            predicate_pushdown: false,
            column_pruning: false,
            limit_pushdown: false,
        }
    }
}

/// Remote byte-source behavior (HTTP/S3 fetches).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchSettings {
    /// Attempts per object request before surfacing the failure.
    pub retry_attempts: usize,
    /// Sleep between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Objects larger than this are fetched with ranged gets.
    pub range_chunk_size_bytes: usize,
    /// Overall request timeout, seconds.
    pub timeout_secs: Option<u64>,
    /// Connect timeout, seconds.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 250,
            range_chunk_size_bytes: 8 * 1024 * 1024,
            timeout_secs: Some(30),
            connect_timeout_secs: Some(5),
        }
    }
}

impl FetchSettings {
    /// Defaults overridden by `FSQ_FETCH_*` environment variables.
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Some(v) = env_parse::<usize>("FSQ_FETCH_RETRY_ATTEMPTS") {
            s.retry_attempts = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("FSQ_FETCH_RETRY_BACKOFF_MS") {
            s.retry_backoff_ms = v;
        }
        if let Some(v) = env_parse::<usize>("FSQ_FETCH_RANGE_CHUNK_SIZE") {
            s.range_chunk_size_bytes = v.max(1024);
        }
        if let Some(v) = env_parse::<u64>("FSQ_FETCH_TIMEOUT_SECS") {
            s.timeout_secs = Some(v.max(1));
        }
        if let Some(v) = env_parse::<u64>("FSQ_FETCH_CONNECT_TIMEOUT_SECS") {
            s.connect_timeout_secs = Some(v.max(1));
        }
        s
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|x| x.parse::<T>().ok())
}

/// Global engine/session configuration shared across planner/reader layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows sampled by string-based readers when inferring a schema.
    pub infer_sample_rows: usize,
    /// Optimizer rule toggles.
    #[serde(default)]
    pub optimizer: OptimizerToggles,
    /// Remote fetch behavior.
    #[serde(default)]
    pub fetch: FetchSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            infer_sample_rows: 100,
            optimizer: OptimizerToggles::default(),
            fetch: FetchSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sample_one_hundred_rows() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.infer_sample_rows, 100);
        assert!(cfg.optimizer.predicate_pushdown);
    }

    #[test]
    fn disabled_toggles_turn_every_rule_off() {
        let t = OptimizerToggles::disabled();
        assert!(!t.partition_pruning && !t.predicate_pushdown);
        assert!(!t.column_pruning && !t.limit_pushdown);
    }
}

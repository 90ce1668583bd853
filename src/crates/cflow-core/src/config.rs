//! Configuration shared by the CLI and graph-source adapters.
//!
//! Plain struct, `serde`-deserialized, in the style the rest of this
//! codebase uses for configuration rather than a bespoke config DSL.

use serde::{Deserialize, Serialize};

/// Runtime configuration for a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the node to start execution at. Required.
    pub start_node: String,
    /// Whether a run shares the ambient dependency cache or starts fresh.
    #[serde(default)]
    pub cache_usage: CacheUsageConfig,
    /// Size of the blocking worker pool `tokio` dispatches to; `None`
    /// leaves the runtime default in place.
    #[serde(default)]
    pub blocking_threads: Option<usize>,
}

/// Serializable mirror of [`crate::scheduler::CacheUsage`], since the
/// scheduler's own enum has no `serde` impl (it is not part of any wire
/// format, only of the in-process API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheUsageConfig {
    #[default]
    Shared,
    Independent,
}

impl From<CacheUsageConfig> for crate::scheduler::CacheUsage {
    fn from(value: CacheUsageConfig) -> Self {
        match value {
            CacheUsageConfig::Shared => crate::scheduler::CacheUsage::Shared,
            CacheUsageConfig::Independent => crate::scheduler::CacheUsage::Independent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_shared_cache() {
        let yaml = "start_node: start\n";
        let cfg: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.cache_usage, CacheUsageConfig::Shared);
        assert_eq!(cfg.blocking_threads, None);
    }

    #[test]
    fn parses_independent_cache_usage() {
        let yaml = "start_node: start\ncache_usage: independent\n";
        let cfg: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.cache_usage, CacheUsageConfig::Independent);
    }
}

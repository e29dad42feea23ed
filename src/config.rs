//! Analyzer configuration and its builder.

use crate::simplify::DEFAULT_MAX_PASSES;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Memoize results per (class, captured values).
    pub cache_enabled: bool,
    /// Upper bound on cached entries; `None` is unbounded. Once full, new
    /// results are returned but not stored.
    pub cache_capacity: Option<usize>,
    /// Pass limit for the simplifier's fixed-point loop.
    pub max_simplify_passes: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { cache_enabled: true, cache_capacity: None, max_simplify_passes: DEFAULT_MAX_PASSES }
    }
}

impl AnalyzerConfig {
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::new()
    }
}

#[derive(Debug, Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn new() -> Self {
        Self { config: AnalyzerConfig::default() }
    }
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = Some(capacity);
        self
    }
    pub fn max_simplify_passes(mut self, passes: usize) -> Self {
        self.config.max_simplify_passes = passes;
        self
    }
    pub fn build(self) -> AnalyzerConfig {
        self.config
    }
}

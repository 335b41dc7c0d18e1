//! Engine configuration.
//!
//! Every section has serde defaults, so a TOML file only needs to mention the
//! values it changes:
//!
//! ```toml
//! [index]
//! exclude_patterns = ["**/fixtures/**"]
//! worker_count = 16
//!
//! [window]
//! max_tokens = 32000
//! ```

use crate::error::{ContextError, Result};
use crate::research::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How the indexer walks and processes a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// When non-empty, only matching files are indexed. Also overrides the
    /// built-in default excludes.
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Apply the built-in exclude list (VCS, build output, lockfiles, binaries)
    pub default_excludes: bool,
    /// Files larger than this (bytes) are skipped
    pub max_file_size: u64,
    pub extract_symbols: bool,
    pub extract_imports: bool,
    pub extract_exports: bool,
    pub generate_embeddings: bool,
    /// Files processed concurrently per batch
    pub worker_count: usize,
    pub embedding_dimension: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            default_excludes: true,
            max_file_size: 1024 * 1024,
            extract_symbols: true,
            extract_imports: true,
            extract_exports: true,
            generate_embeddings: true,
            worker_count: 8,
            embedding_dimension: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_capacity: 256,
        }
    }
}

impl SearchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Token budget for a context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub max_tokens: usize,
    /// Held back for the model's response
    pub reserved_tokens: usize,
    /// Compression evicts until utilization is at or below this fraction
    pub compression_threshold: f32,
    /// Compress automatically when an add would overflow the budget
    pub auto_compress: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            reserved_tokens: 1000,
            compression_threshold: 0.8,
            auto_compress: true,
        }
    }
}

/// Engine-wide defaults for research tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub depth: u8,
    /// Results requested per source query
    pub breadth: usize,
    pub timeout_secs: u64,
    pub sources: Vec<SourceKind>,
    pub min_relevance: f32,
    pub min_confidence: f32,
    pub max_findings: usize,
    pub max_concurrent_sources: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            breadth: 5,
            timeout_secs: 30,
            sources: vec![SourceKind::Code, SourceKind::Documentation, SourceKind::Memory],
            min_relevance: 0.1,
            min_confidence: 0.3,
            max_findings: 20,
            max_concurrent_sources: 4,
            cache_ttl_secs: 600,
            cache_capacity: 64,
        }
    }
}

impl ResearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_searches: usize,
    pub max_concurrent_research: usize,
    pub default_max_results: usize,
    /// Results requested from each search task
    pub search_top_k: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// Characters kept in each record's summary
    pub summary_length: usize,
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_searches: 4,
            max_concurrent_research: 2,
            default_max_results: 20,
            search_top_k: 10,
            cache_ttl_secs: 300,
            cache_capacity: 100,
            summary_length: 200,
            request_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub window: WindowConfig,
    pub research: ResearchConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ContextError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.index.worker_count == 0 {
            return Err(ContextError::Config("index.worker_count must be at least 1".into()));
        }
        if self.index.embedding_dimension == 0 {
            return Err(ContextError::Config(
                "index.embedding_dimension must be at least 1".into(),
            ));
        }
        if self.window.reserved_tokens >= self.window.max_tokens {
            return Err(ContextError::Config(format!(
                "window.reserved_tokens ({}) must be below window.max_tokens ({})",
                self.window.reserved_tokens, self.window.max_tokens
            )));
        }
        let threshold = self.window.compression_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ContextError::Config(format!(
                "window.compression_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        for (name, value) in [
            ("research.min_relevance", self.research.min_relevance),
            ("research.min_confidence", self.research.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ContextError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.research.max_concurrent_sources == 0
            || self.orchestrator.max_concurrent_searches == 0
            || self.orchestrator.max_concurrent_research == 0
        {
            return Err(ContextError::Config("concurrency caps must be at least 1".into()));
        }
        if self.orchestrator.search_top_k == 0
            || self.orchestrator.search_top_k > crate::types::SearchQuery::MAX_TOP_K
        {
            return Err(ContextError::Config(
                "orchestrator.search_top_k must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [index]
            exclude_patterns = ["**/fixtures/**"]
            worker_count = 16

            [research]
            sources = ["code", "web"]
            "#,
        )
        .unwrap();

        assert_eq!(config.index.worker_count, 16);
        assert_eq!(config.index.exclude_patterns, vec!["**/fixtures/**".to_string()]);
        assert_eq!(config.index.max_file_size, IndexConfig::default().max_file_size);
        assert_eq!(config.research.sources, vec![SourceKind::Code, SourceKind::Web]);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_rejects_reserved_above_budget() {
        let err = EngineConfig::from_toml_str(
            r#"
            [window]
            max_tokens = 100
            reserved_tokens = 100
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ContextError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.index.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("[index\nworker_count = ").unwrap_err();
        assert!(matches!(err, ContextError::Toml(_)));
    }
}

//! Multi-mode search over the repository index.
//!
//! Pipeline:
//! 1. Validate the query and check the result cache (keyed by the serialized query)
//! 2. Score candidates with the requested strategy (semantic, keyword, symbol,
//!    regex, or hybrid = 0.6 semantic + 0.4 keyword)
//! 3. Apply filters, sort by score descending, truncate to `top_k`
//! 4. Attach content and record file accesses

mod filter;
pub mod scoring;

pub use filter::CompiledFilter;
pub use scoring::{KEYWORD_WEIGHT, SEMANTIC_WEIGHT};

use crate::cache::{CacheStats, TtlCache};
use crate::config::SearchConfig;
use crate::embedding::Embedder;
use crate::error::{ContextError, Result};
use crate::events::{CacheKind, EngineEvent, EventBus};
use crate::state::SharedIndex;
use crate::text::truncate;
use crate::types::{ResultKind, SearchMode, SearchQuery, SearchResult};
use regex::Regex;
use scoring::{Scored, Target};
use std::cmp::Ordering;
use std::sync::Arc;

/// Executes [`SearchQuery`]s against a shared index.
pub struct SearchEngine {
    index: SharedIndex,
    embedder: Arc<dyn Embedder>,
    cache: TtlCache<String, Vec<SearchResult>>,
    events: Option<EventBus>,
}

impl SearchEngine {
    pub fn new(index: SharedIndex, embedder: Arc<dyn Embedder>, config: &SearchConfig) -> Self {
        Self {
            index,
            embedder,
            cache: TtlCache::new(config.cache_ttl(), config.cache_capacity),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Run a query. Results are sorted by score descending (ties by id) and
    /// hold at most `top_k` entries.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let pattern = validate(query)?;

        let key = serde_json::to_string(query)?;
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Search cache hit for '{}'", truncate(&query.query, 60));
            self.publish(EngineEvent::CacheHit {
                cache: CacheKind::Search,
                key: query.query.clone(),
            });
            self.record_accesses(&cached);
            return Ok(cached);
        }
        self.publish(EngineEvent::CacheMiss {
            cache: CacheKind::Search,
            key: query.query.clone(),
        });

        // The only await: everything after this is synchronous scoring.
        let query_embedding = match query.mode {
            SearchMode::Semantic | SearchMode::Hybrid => Some(self.embedder.embed(&query.query).await?),
            _ => None,
        };

        let index = self.index.as_ref();
        let mut candidates = match query.mode {
            SearchMode::Semantic => {
                scoring::semantic(index, query_embedding.as_deref().unwrap_or_default(), query.min_score)
            }
            SearchMode::Keyword => scoring::keyword(index, &query.query),
            SearchMode::Symbol => scoring::symbol(index, &query.query),
            SearchMode::Regex => match &pattern {
                Some(pattern) => scoring::regex(index, pattern),
                None => Vec::new(),
            },
            SearchMode::Hybrid => scoring::fuse_hybrid(
                scoring::semantic(index, query_embedding.as_deref().unwrap_or_default(), query.min_score),
                scoring::keyword(index, &query.query),
            ),
        };

        if let Some(filters) = query.filters.as_ref().filter(|f| !f.is_empty()) {
            let compiled = CompiledFilter::compile(filters)?;
            candidates.retain(|c| compiled.matches(index, c));
        }

        rank(&mut candidates);

        let results: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|c| self.materialize(c, query.include_content))
            .take(query.top_k)
            .collect();

        tracing::debug!(
            "Search '{}' ({}) returned {} results",
            truncate(&query.query, 60),
            query.mode.as_str(),
            results.len()
        );

        self.record_accesses(&results);
        self.cache.insert(key, results.clone());
        Ok(results)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Build the public result. `None` when the target was removed after scoring.
    fn materialize(&self, candidate: Scored, include_content: bool) -> Option<SearchResult> {
        match candidate.target {
            Target::File(id) => {
                let file = self.index.get_file(id)?;
                Some(SearchResult {
                    id: id.to_string(),
                    kind: ResultKind::File,
                    score: candidate.score,
                    content: include_content.then(|| file.content.to_string()),
                    location: None,
                    symbol: None,
                    file: Some(file.summary()),
                    highlights: candidate.highlights,
                })
            }
            Target::Symbol(id) => {
                let symbol = self.index.get_symbol(id)?;
                let file = self.index.get_file(symbol.location.file_id)?;
                Some(SearchResult {
                    id: id.to_string(),
                    kind: ResultKind::Symbol,
                    score: candidate.score,
                    content: include_content.then(|| symbol.signature.clone()),
                    location: Some(symbol.location.clone()),
                    symbol: Some(symbol),
                    file: Some(file.summary()),
                    highlights: candidate.highlights,
                })
            }
        }
    }

    fn record_accesses(&self, results: &[SearchResult]) {
        for result in results {
            if result.kind == ResultKind::File {
                if let Some(file) = &result.file {
                    self.index.record_access(file.id);
                }
            }
        }
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Reject malformed queries. Returns the compiled pattern for regex mode.
fn validate(query: &SearchQuery) -> Result<Option<Regex>> {
    if query.query.trim().is_empty() {
        return Err(ContextError::validation("query", "must not be empty"));
    }
    if query.top_k == 0 || query.top_k > SearchQuery::MAX_TOP_K {
        return Err(ContextError::validation(
            "top_k",
            format!("must be between 1 and {}, got {}", SearchQuery::MAX_TOP_K, query.top_k),
        ));
    }
    if !(0.0..=1.0).contains(&query.min_score) {
        return Err(ContextError::validation(
            "min_score",
            format!("must be between 0 and 1, got {}", query.min_score),
        ));
    }
    if query.mode == SearchMode::Regex {
        let pattern = Regex::new(&query.query)
            .map_err(|e| ContextError::validation("query", format!("invalid regex: {}", e)))?;
        return Ok(Some(pattern));
    }
    Ok(None)
}

/// Score descending, then target id ascending, so equal scores come back in a
/// stable order.
fn rank(candidates: &mut [Scored]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.target.cmp(&b.target))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::parsing::{ExtractOptions, PatternExtractor, SymbolExtractor};
    use crate::state::{FileDraft, RepositoryIndex, create_index};
    use crate::types::{Language, SearchFilter};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn engine() -> SearchEngine {
        let index = create_index();
        let embedder = HashEmbedder::new(128);
        let files = [
            ("/r/src/auth.ts", "export function validateToken(token) {\n  return token.length > 0;\n}\n"),
            ("/r/src/user.ts", "import { validateToken } from './auth';\nexport class UserService {}\n"),
            ("/r/docs/auth.md", "# Auth\nTokens are validated by validateToken.\n"),
            ("/r/src/chart.ts", "export function renderChart(axis) {}\n"),
        ];
        for (path, content) in files {
            add(&index, &embedder, path, content);
        }
        index.set_root(PathBuf::from("/r"));
        SearchEngine::new(index, Arc::new(embedder), &SearchConfig::default())
    }

    fn add(index: &RepositoryIndex, embedder: &HashEmbedder, path: &str, content: &str) {
        let path = PathBuf::from(path);
        let language = Language::from_path(&path);
        let extraction = PatternExtractor::new().extract(content, language, ExtractOptions::default());
        index.upsert_file(FileDraft {
            embedding: Some(Arc::from(embedder.embed_sync(&format!("{}\n{}", path.display(), content)))),
            path,
            content: Arc::from(content),
            language,
            size: content.len() as u64,
            modified: None,
            symbols: extraction.symbols,
            imports: extraction.imports,
            exports: extraction.exports,
        });
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let engine = engine();
        for query in [
            SearchQuery::new("   ", SearchMode::Keyword),
            SearchQuery::new("token", SearchMode::Keyword).with_top_k(0),
            SearchQuery::new("token", SearchMode::Keyword).with_top_k(101),
            SearchQuery::new("token", SearchMode::Semantic).with_min_score(1.5),
            SearchQuery::new("(unclosed", SearchMode::Regex),
        ] {
            let err = engine.search(&query).await.unwrap_err();
            assert!(err.is_validation(), "expected validation error, got {err}");
        }
    }

    #[tokio::test]
    async fn test_symbol_search_exact_first() {
        let engine = engine();
        let results = engine
            .search(&SearchQuery::new("validateToken", SearchMode::Symbol))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ResultKind::Symbol);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].symbol.as_ref().unwrap().name, "validateToken");

        let partial = engine
            .search(&SearchQuery::new("service", SearchMode::Symbol))
            .await
            .unwrap();
        assert_eq!(partial[0].score, 0.7);
    }

    #[tokio::test]
    async fn test_keyword_with_language_filter() {
        let engine = engine();
        let query = SearchQuery::new("validateToken", SearchMode::Keyword).with_filters(SearchFilter {
            languages: Language::documentation(),
            ..Default::default()
        });
        let results = engine.search(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file.as_ref().unwrap().path, PathBuf::from("/r/docs/auth.md"));
    }

    #[tokio::test]
    async fn test_results_sorted_and_truncated() {
        let engine = engine();
        for mode in [SearchMode::Keyword, SearchMode::Semantic, SearchMode::Hybrid] {
            let results = engine
                .search(&SearchQuery::new("validate token", mode).with_top_k(2))
                .await
                .unwrap();
            assert!(results.len() <= 2);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_regex_with_content() {
        let engine = engine();
        let results = engine
            .search(&SearchQuery::new(r"export\s+class", SearchMode::Regex).with_content())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].highlights[0].line, 2);
        assert!(results[0].content.as_ref().unwrap().contains("UserService"));
    }

    #[tokio::test]
    async fn test_cache_hit_returns_same_results_and_records_access() {
        let engine = engine();
        let query = SearchQuery::new("token", SearchMode::Keyword);
        let first = engine.search(&query).await.unwrap();
        let second = engine.search(&query).await.unwrap();
        assert_eq!(first, second);

        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);

        let file_id = first[0].file.as_ref().unwrap().id;
        assert_eq!(engine.index().get_file(file_id).unwrap().access_count, 2);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_min_score_applies_to_semantic() {
        let engine = engine();
        let results = engine
            .search(&SearchQuery::new("validate token", SearchMode::Semantic).with_min_score(0.3))
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.score >= 0.3));
    }
}

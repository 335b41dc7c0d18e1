//! Request orchestration.
//!
//! A [`ContextRequest`] is decomposed into search and research sub-tasks by
//! its declared needs. Both task sets run concurrently, each bounded by its own
//! cap; results are converted to [`ContextInfo`] records, merged, ranked and
//! cached by normalized query.
//!
//! ```text
//! Idle → Searching → Synthesizing → Reporting → Idle
//!            └──── every task failed ────→ Error → Idle
//! ```

mod record;

pub use record::{ContextInfo, Importance, InfoKind, InfoMetadata, merge};

use crate::cache::{CacheStats, TtlCache};
use crate::config::OrchestratorConfig;
use crate::context::{AddOutcome, ContextWindow, estimate_tokens};
use crate::error::{ContextError, Result};
use crate::events::{CacheKind, EngineEvent, EventBus, TaskKind};
use crate::research::{ResearchEngine, ResearchOverrides};
use crate::search::SearchEngine;
use crate::text::{normalize_query, truncate};
use crate::types::{Language, SearchFilter, SearchMode, SearchQuery};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Initializing,
    Searching,
    Synthesizing,
    Reporting,
    Error,
}

/// What kind of context a request is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextNeed {
    CodeContext,
    Dependencies,
    Patterns,
    ErrorResolution,
    Solutions,
    Documentation,
    Api,
}

impl ContextNeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeContext => "code_context",
            Self::Dependencies => "dependencies",
            Self::Patterns => "patterns",
            Self::ErrorResolution => "error_resolution",
            Self::Solutions => "solutions",
            Self::Documentation => "documentation",
            Self::Api => "api",
        }
    }
}

impl std::str::FromStr for ContextNeed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "code" | "code_context" => Ok(Self::CodeContext),
            "dependencies" | "deps" => Ok(Self::Dependencies),
            "patterns" => Ok(Self::Patterns),
            "error" | "error_resolution" => Ok(Self::ErrorResolution),
            "solutions" => Ok(Self::Solutions),
            "documentation" | "docs" => Ok(Self::Documentation),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown need '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestConstraints {
    /// Falls back to the configured default when unset
    pub max_results: Option<usize>,
    pub file_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub languages: Vec<Language>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextRequest {
    pub id: String,
    pub query: String,
    pub needs: Vec<ContextNeed>,
    pub constraints: RequestConstraints,
    /// Deadline for each sub-task; the configured timeout when unset
    pub timeout: Option<Duration>,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            needs: Vec::new(),
            constraints: RequestConstraints::default(),
            timeout: None,
        }
    }

    pub fn with_need(mut self, need: ContextNeed) -> Self {
        if !self.needs.contains(&need) {
            self.needs.push(need);
        }
        self
    }

    pub fn with_needs(self, needs: impl IntoIterator<Item = ContextNeed>) -> Self {
        needs.into_iter().fold(self, Self::with_need)
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.constraints.max_results = Some(max_results);
        self
    }

    pub fn with_constraints(mut self, constraints: RequestConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseStats {
    pub total_results: usize,
    pub search_results: usize,
    pub research_results: usize,
    pub cache_hits: usize,
    /// Estimated tokens of all returned details
    pub tokens_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextResponse {
    pub request_id: String,
    pub info: Vec<ContextInfo>,
    pub stats: ResponseStats,
    pub duration: Duration,
    /// False only when every sub-task failed
    pub success: bool,
    pub errors: Vec<String>,
}

impl ContextResponse {
    /// Place every record into a window, priority by importance tier. Records
    /// that do not fit are skipped.
    pub fn pack_into(&self, window: &mut ContextWindow) -> Vec<AddOutcome> {
        self.info
            .iter()
            .filter_map(|info| {
                let content = format!("{}\n{}", info.title, info.detail);
                match window.add_snippet(info.id.clone(), content, info.importance.priority()) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        tracing::debug!("Skipping {} when packing window: {}", info.id, e);
                        None
                    }
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Incremental mean over every request, cache hits included
    pub average_response_time: Duration,
    pub total_tokens_used: u64,
}

impl OrchestratorStats {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }

    fn record(&mut self, duration: Duration, success: bool, tokens: usize) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.total_tokens_used += tokens as u64;

        let n = self.total_requests as f64;
        let mean = self.average_response_time.as_secs_f64();
        self.average_response_time = Duration::from_secs_f64(mean + (duration.as_secs_f64() - mean) / n);
    }
}

#[derive(Debug, Clone)]
struct SearchTask {
    id: String,
    query: SearchQuery,
    needs: Vec<ContextNeed>,
}

#[derive(Debug, Clone)]
struct ResearchUnit {
    id: String,
    topic: String,
    questions: Vec<String>,
}

/// Either a batch of records or an error message.
type TaskOutcome = std::result::Result<Vec<ContextInfo>, String>;

pub struct ContextOrchestrator {
    config: OrchestratorConfig,
    search: Arc<SearchEngine>,
    research: Arc<ResearchEngine>,
    cache: TtlCache<String, ContextResponse>,
    state: RwLock<OrchestratorState>,
    stats: Mutex<OrchestratorStats>,
    events: Option<EventBus>,
}

impl ContextOrchestrator {
    pub fn new(config: OrchestratorConfig, search: Arc<SearchEngine>, research: Arc<ResearchEngine>) -> Self {
        Self {
            cache: TtlCache::new(config.cache_ttl(), config.cache_capacity),
            config,
            search,
            research,
            state: RwLock::new(OrchestratorState::Idle),
            stats: Mutex::new(OrchestratorStats::default()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.read()
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.stats.lock().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub async fn initialize(&self) -> Result<()> {
        self.set_state(OrchestratorState::Initializing);
        let result = self.research.initialize().await;
        self.set_state(match result {
            Ok(()) => OrchestratorState::Idle,
            Err(_) => OrchestratorState::Error,
        });
        result
    }

    /// Answer a request. Sub-task failures are reported in the response's
    /// `errors`; only an invalid request is an `Err`.
    pub async fn handle_request(&self, request: ContextRequest) -> Result<ContextResponse> {
        let start = Instant::now();
        if let Err(e) = validate(&request) {
            self.stats.lock().record(start.elapsed(), false, 0);
            return Err(e);
        }

        let key = normalize_query(&request.query);
        if let Some(mut cached) = self.cache.get(&key) {
            tracing::debug!("Response cache hit for '{}'", truncate(&request.query, 60));
            self.publish(EngineEvent::CacheHit {
                cache: CacheKind::Response,
                key: key.clone(),
            });
            cached.request_id = request.id;
            cached.stats.cache_hits = 1;
            cached.duration = start.elapsed();

            let mut stats = self.stats.lock();
            stats.cache_hits += 1;
            stats.record(cached.duration, cached.success, cached.stats.tokens_used);
            return Ok(cached);
        }
        self.publish(EngineEvent::CacheMiss {
            cache: CacheKind::Response,
            key: key.clone(),
        });
        self.stats.lock().cache_misses += 1;

        let (searches, research) = self.plan(&request);
        let timeout = request.timeout.unwrap_or_else(|| self.config.request_timeout());
        tracing::info!(
            "Handling request '{}' with {} search and {} research tasks",
            truncate(&request.query, 60),
            searches.len(),
            research.len()
        );

        self.set_state(OrchestratorState::Searching);
        let (search_outcomes, research_outcomes) = tokio::join!(
            self.run_searches(searches, timeout),
            self.run_research(research, timeout),
        );

        self.set_state(OrchestratorState::Synthesizing);
        let mut records = Vec::new();
        let mut errors = Vec::new();
        let mut completed = 0;
        let mut search_results = 0;
        let mut research_results = 0;
        for (is_search, outcome) in search_outcomes
            .into_iter()
            .map(|o| (true, o))
            .chain(research_outcomes.into_iter().map(|o| (false, o)))
        {
            match outcome {
                Ok(batch) => {
                    completed += 1;
                    if is_search {
                        search_results += batch.len();
                    } else {
                        research_results += batch.len();
                    }
                    records.extend(batch);
                }
                Err(e) => errors.push(e),
            }
        }
        let success = completed > 0;

        let max_results = request
            .constraints
            .max_results
            .unwrap_or(self.config.default_max_results);
        let info = merge(records, max_results);

        self.set_state(OrchestratorState::Reporting);
        let tokens_used = info.iter().map(|i| estimate_tokens(&i.detail)).sum();
        let response = ContextResponse {
            request_id: request.id,
            stats: ResponseStats {
                total_results: info.len(),
                search_results,
                research_results,
                cache_hits: 0,
                tokens_used,
            },
            info,
            duration: start.elapsed(),
            success,
            errors,
        };

        if success {
            self.cache.insert(key, response.clone());
            self.set_state(OrchestratorState::Idle);
        } else {
            tracing::warn!("Every task failed for '{}'", truncate(&request.query, 60));
            self.set_state(OrchestratorState::Error);
            self.set_state(OrchestratorState::Idle);
        }
        self.stats.lock().record(response.duration, success, tokens_used);

        tracing::info!(
            "Request answered with {} results ({} errors) in {:?}",
            response.info.len(),
            response.errors.len(),
            response.duration
        );
        Ok(response)
    }

    /// Map needs to sub-tasks. Needs that resolve to the same search run once.
    fn plan(&self, request: &ContextRequest) -> (Vec<SearchTask>, Vec<ResearchUnit>) {
        let needs = if request.needs.is_empty() {
            vec![ContextNeed::CodeContext]
        } else {
            request.needs.clone()
        };

        let constraints = &request.constraints;
        let code_filter = SearchFilter {
            languages: constraints.languages.clone(),
            include_paths: constraints.file_patterns.clone(),
            exclude_paths: constraints.exclude_patterns.clone(),
            ..Default::default()
        };
        let doc_filter = SearchFilter {
            languages: Language::documentation(),
            ..code_filter.clone()
        };
        let top_k = self.config.search_top_k.clamp(1, SearchQuery::MAX_TOP_K);

        let mut searches: Vec<SearchTask> = Vec::new();
        let mut research = Vec::new();
        for need in needs {
            let query = match need {
                ContextNeed::CodeContext | ContextNeed::Dependencies | ContextNeed::Patterns => {
                    SearchQuery::new(request.query.clone(), SearchMode::Hybrid).with_filters(code_filter.clone())
                }
                ContextNeed::Documentation | ContextNeed::Api => {
                    SearchQuery::new(request.query.clone(), SearchMode::Keyword).with_filters(doc_filter.clone())
                }
                ContextNeed::ErrorResolution | ContextNeed::Solutions => {
                    let question = match need {
                        ContextNeed::ErrorResolution => format!("What causes {}?", request.query),
                        _ => format!("How can {} be solved?", request.query),
                    };
                    research.push(ResearchUnit {
                        id: format!("{}:research:{}", request.id, research.len()),
                        topic: request.query.clone(),
                        questions: vec![question],
                    });
                    continue;
                }
            }
            .with_top_k(top_k)
            .with_content();

            match searches.iter_mut().find(|t| t.query == query) {
                Some(task) => task.needs.push(need),
                None => searches.push(SearchTask {
                    id: format!("{}:search:{}", request.id, searches.len()),
                    query,
                    needs: vec![need],
                }),
            }
        }
        (searches, research)
    }

    async fn run_searches(&self, tasks: Vec<SearchTask>, timeout: Duration) -> Vec<TaskOutcome> {
        let summary_length = self.config.summary_length;
        stream::iter(tasks)
            .map(|task| async move {
                self.publish(EngineEvent::TaskStarted {
                    task_id: task.id.clone(),
                    kind: TaskKind::Search,
                });
                let outcome = match tokio::time::timeout(timeout, self.search.search(&task.query)).await {
                    Ok(Ok(results)) => {
                        let tags: Vec<String> = task.needs.iter().map(|n| n.as_str().to_string()).collect();
                        let index = self.search.index();
                        Ok(results
                            .into_iter()
                            .map(|r| ContextInfo::from_search(r, task.query.mode, tags.clone(), index, summary_length))
                            .collect())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ContextError::Timeout {
                        operation: format!("search task {}", task.id),
                        elapsed: timeout,
                    }),
                };
                self.finish_task(&task.id, TaskKind::Search, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_searches.max(1))
            .collect()
            .await
    }

    async fn run_research(&self, units: Vec<ResearchUnit>, timeout: Duration) -> Vec<TaskOutcome> {
        let summary_length = self.config.summary_length;
        stream::iter(units)
            .map(|unit| async move {
                self.publish(EngineEvent::TaskStarted {
                    task_id: unit.id.clone(),
                    kind: TaskKind::Research,
                });
                let task_id = match self.research.create_task(
                    unit.topic.clone(),
                    unit.questions.clone(),
                    ResearchOverrides::default(),
                ) {
                    Ok(id) => id,
                    Err(e) => return self.finish_task(&unit.id, TaskKind::Research, Err(e)),
                };
                let run = tokio::time::timeout(timeout, self.research.execute_research(&task_id)).await;
                // The records carry everything the response needs
                self.research.remove_task(&task_id);
                let outcome = match run {
                    Ok(Ok(task)) => {
                        let mut records: Vec<ContextInfo> = ContextInfo::from_synthesis(&task, summary_length)
                            .into_iter()
                            .collect();
                        records.extend(
                            task.findings
                                .iter()
                                .cloned()
                                .map(|f| ContextInfo::from_finding(f, &task.id, summary_length)),
                        );
                        Ok(records)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ContextError::Timeout {
                        operation: format!("research task {}", unit.id),
                        elapsed: timeout,
                    }),
                };
                self.finish_task(&unit.id, TaskKind::Research, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_research.max(1))
            .collect()
            .await
    }

    fn finish_task(&self, task_id: &str, kind: TaskKind, outcome: Result<Vec<ContextInfo>>) -> TaskOutcome {
        match outcome {
            Ok(records) => {
                tracing::debug!("Task {} produced {} records", task_id, records.len());
                self.publish(EngineEvent::TaskCompleted {
                    task_id: task_id.to_string(),
                    kind,
                    results: records.len(),
                });
                Ok(records)
            }
            Err(e) => {
                tracing::warn!("Task {} failed: {}", task_id, e);
                self.publish(EngineEvent::TaskFailed {
                    task_id: task_id.to_string(),
                    kind,
                    error: e.to_string(),
                });
                Err(format!("{}: {}", task_id, e))
            }
        }
    }

    fn set_state(&self, to: OrchestratorState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            self.publish(EngineEvent::OrchestratorStateChanged { from, to });
        }
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn validate(request: &ContextRequest) -> Result<()> {
    if request.query.trim().is_empty() {
        return Err(ContextError::validation("query", "must not be empty"));
    }
    if request.constraints.max_results == Some(0) {
        return Err(ContextError::validation("max_results", "must be at least 1"));
    }
    if request.timeout.is_some_and(|t| t.is_zero()) {
        return Err(ContextError::validation("timeout", "must be positive"));
    }
    Ok(())
}

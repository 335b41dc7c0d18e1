//! Research engine.
//!
//! A research task gathers findings from several sources concurrently,
//! analyzes them (filter, rank, cap) and synthesizes a summary with key points,
//! cross-source insights and recommendations.
//!
//! ```text
//! Pending → Gathering → Analyzing → Synthesizing → Completed
//!              └──────────┴────────────┴──→ Failed | Cancelled
//! ```
//!
//! Gathering is best effort: a source that fails or times out contributes no
//! findings and is recorded on the task. Analysis and synthesis failures are
//! fatal to the task.

pub mod sources;

pub use sources::{CodeSource, DocumentationSource, MemoryNote, MemorySource};

use crate::cache::{CacheStats, TtlCache};
use crate::config::ResearchConfig;
use crate::error::{ContextError, Result};
use crate::events::{CacheKind, EngineEvent, EventBus};
use crate::text::{first_sentence, normalize_query, tokenize, truncate};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Weight of relevance in a finding's rank score; confidence gets the rest.
pub const RELEVANCE_WEIGHT: f32 = 0.6;
pub const CONFIDENCE_WEIGHT: f32 = 0.4;

const KEY_POINTS: usize = 5;
const SUMMARY_FINDINGS: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Code,
    Documentation,
    Memory,
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Documentation => "documentation",
            Self::Memory => "memory",
            Self::Web => "web",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "documentation" | "docs" => Ok(Self::Documentation),
            "memory" => Ok(Self::Memory),
            "web" => Ok(Self::Web),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchEngineState {
    Idle,
    Initializing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    Gathering,
    Analyzing,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Gathering => "gathering",
            Self::Analyzing => "analyzing",
            Self::Synthesizing => "synthesizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Resolved settings for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchOptions {
    pub depth: u8,
    /// Results requested from each source
    pub breadth: usize,
    /// Deadline for each source call
    pub timeout: Duration,
    pub sources: Vec<SourceKind>,
    pub min_relevance: f32,
    pub min_confidence: f32,
    pub max_findings: usize,
}

impl ResearchOptions {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            depth: config.depth,
            breadth: config.breadth,
            timeout: config.timeout(),
            sources: config.sources.clone(),
            min_relevance: config.min_relevance,
            min_confidence: config.min_confidence,
            max_findings: config.max_findings,
        }
    }

    /// Caller overrides take precedence over these defaults.
    pub fn merge(mut self, overrides: ResearchOverrides) -> Self {
        if let Some(depth) = overrides.depth {
            self.depth = depth;
        }
        if let Some(breadth) = overrides.breadth {
            self.breadth = breadth;
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = timeout;
        }
        if let Some(sources) = overrides.sources {
            self.sources = sources;
        }
        if let Some(min_relevance) = overrides.min_relevance {
            self.min_relevance = min_relevance;
        }
        if let Some(min_confidence) = overrides.min_confidence {
            self.min_confidence = min_confidence;
        }
        if let Some(max_findings) = overrides.max_findings {
            self.max_findings = max_findings;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.breadth == 0 {
            return Err(ContextError::validation("breadth", "must be at least 1"));
        }
        if self.max_findings == 0 {
            return Err(ContextError::validation("max_findings", "must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(ContextError::validation("timeout", "must be positive"));
        }
        for (field, value) in [
            ("min_relevance", self.min_relevance),
            ("min_confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ContextError::validation(field, format!("must be in [0, 1], got {}", value)));
            }
        }
        Ok(())
    }
}

/// Per-task overrides of the engine defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchOverrides {
    pub depth: Option<u8>,
    pub breadth: Option<usize>,
    pub timeout: Option<Duration>,
    pub sources: Option<Vec<SourceKind>>,
    pub min_relevance: Option<f32>,
    pub min_confidence: Option<f32>,
    pub max_findings: Option<usize>,
}

/// What a source is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchQuery {
    pub task_id: String,
    pub topic: String,
    pub questions: Vec<String>,
    pub depth: u8,
    pub breadth: usize,
}

impl ResearchQuery {
    /// Topic and questions as one search string.
    pub fn text(&self) -> String {
        std::iter::once(self.topic.as_str())
            .chain(self.questions.iter().map(|q| q.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One piece of information from one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub id: String,
    pub source: SourceKind,
    pub title: String,
    pub content: String,
    pub location: Option<PathBuf>,
    /// How well the finding matches the topic, 0..=1
    pub relevance: f32,
    /// How much the source trusts the finding, 0..=1
    pub confidence: f32,
    pub timestamp: SystemTime,
    pub tags: Vec<String>,
}

impl Finding {
    /// Rank score: `0.6 * relevance + 0.4 * confidence`.
    pub fn score(&self) -> f32 {
        RELEVANCE_WEIGHT * self.relevance + CONFIDENCE_WEIGHT * self.confidence
    }
}

/// A pattern across several findings from the same source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub source: SourceKind,
    pub description: String,
    pub finding_ids: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub summary: String,
    pub key_points: Vec<String>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    /// Mean rank score of the findings
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchTask {
    pub id: String,
    pub topic: String,
    pub questions: Vec<String>,
    pub options: ResearchOptions,
    pub status: ResearchStatus,
    pub findings: Vec<Finding>,
    pub synthesis: Option<Synthesis>,
    /// Fatal error, set when the task failed
    pub error: Option<String>,
    /// Sources that failed or timed out during gathering
    pub source_errors: Vec<(SourceKind, String)>,
    /// Served from the topic cache
    pub from_cache: bool,
    pub created_at: SystemTime,
    pub completed_at: Option<SystemTime>,
}

/// A provider of findings.
#[async_trait]
pub trait ResearchSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn gather(&self, query: &ResearchQuery) -> Result<Vec<Finding>>;
}

#[derive(Debug, Clone)]
struct CachedResearch {
    findings: Vec<Finding>,
    synthesis: Synthesis,
}

// ============================================================================
// Engine
// ============================================================================

pub struct ResearchEngine {
    config: ResearchConfig,
    sources: RwLock<BTreeMap<SourceKind, Arc<dyn ResearchSource>>>,
    tasks: DashMap<String, ResearchTask>,
    cancellations: DashMap<String, Arc<AtomicBool>>,
    cache: TtlCache<String, CachedResearch>,
    state: RwLock<ResearchEngineState>,
    events: Option<EventBus>,
}

impl ResearchEngine {
    pub fn new(config: ResearchConfig) -> Self {
        Self {
            cache: TtlCache::new(config.cache_ttl(), config.cache_capacity),
            config,
            sources: RwLock::new(BTreeMap::new()),
            tasks: DashMap::new(),
            cancellations: DashMap::new(),
            state: RwLock::new(ResearchEngineState::Idle),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a source, replacing any previous source of the same kind.
    pub fn register_source(&self, source: Arc<dyn ResearchSource>) {
        let kind = source.kind();
        if self.sources.write().insert(kind, source).is_some() {
            tracing::debug!("Replaced research source {}", kind.as_str());
        }
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.read().keys().copied().collect()
    }

    pub fn state(&self) -> ResearchEngineState {
        *self.state.read()
    }

    /// Startup pass: reports enabled sources that have nothing registered.
    pub async fn initialize(&self) -> Result<()> {
        self.set_state(ResearchEngineState::Initializing);

        let registered = self.source_kinds();
        for kind in &self.config.sources {
            if !registered.contains(kind) {
                tracing::warn!("Research source '{}' is enabled but not registered", kind.as_str());
            }
        }
        tracing::info!("Research engine ready with {} sources", registered.len());

        self.set_state(ResearchEngineState::Idle);
        Ok(())
    }

    /// Create a pending task and return its id.
    pub fn create_task(
        &self,
        topic: impl Into<String>,
        questions: Vec<String>,
        overrides: ResearchOverrides,
    ) -> Result<String> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(ContextError::validation("topic", "must not be empty"));
        }
        let options = ResearchOptions::from_config(&self.config).merge(overrides);
        options.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        self.tasks.insert(
            id.clone(),
            ResearchTask {
                id: id.clone(),
                topic,
                questions,
                options,
                status: ResearchStatus::Pending,
                findings: Vec::new(),
                synthesis: None,
                error: None,
                source_errors: Vec::new(),
                from_cache: false,
                created_at: SystemTime::now(),
                completed_at: None,
            },
        );
        self.cancellations.insert(id.clone(), Arc::new(AtomicBool::new(false)));
        self.publish(EngineEvent::ResearchStatusChanged {
            task_id: id.clone(),
            status: ResearchStatus::Pending,
        });
        Ok(id)
    }

    /// Create and execute a task in one call.
    pub async fn research(
        &self,
        topic: impl Into<String>,
        questions: Vec<String>,
        overrides: ResearchOverrides,
    ) -> Result<ResearchTask> {
        let id = self.create_task(topic, questions, overrides)?;
        self.execute_research(&id).await
    }

    /// Run a pending task to a terminal state.
    ///
    /// A cancelled task is returned as-is. Analysis and synthesis failures
    /// mark the task failed and are returned as errors.
    pub async fn execute_research(&self, task_id: &str) -> Result<ResearchTask> {
        let task = self.snapshot(task_id)?;
        match task.status {
            ResearchStatus::Pending => {}
            ResearchStatus::Cancelled => return Ok(task),
            other => {
                return Err(ContextError::validation(
                    "task_id",
                    format!("task {} is already {}", task_id, other.as_str()),
                ));
            }
        }

        let start = Instant::now();
        let key = cache_key(&task.topic, &task.questions);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Research cache hit for '{}'", truncate(&task.topic, 60));
            self.publish(EngineEvent::CacheHit {
                cache: CacheKind::Research,
                key: task.topic.clone(),
            });
            self.update(task_id, |t| {
                t.findings = cached.findings;
                t.synthesis = Some(cached.synthesis);
                t.from_cache = true;
            });
            self.transition(task_id, ResearchStatus::Completed);
            return self.snapshot(task_id);
        }
        self.publish(EngineEvent::CacheMiss {
            cache: CacheKind::Research,
            key: task.topic.clone(),
        });

        if !self.transition(task_id, ResearchStatus::Gathering) {
            return self.snapshot(task_id);
        }
        let query = ResearchQuery {
            task_id: task_id.to_string(),
            topic: task.topic.clone(),
            questions: task.questions.clone(),
            depth: task.options.depth,
            breadth: task.options.breadth,
        };
        let (findings, source_errors) = self.gather(&query, &task.options).await;
        self.update(task_id, |t| t.source_errors = source_errors);

        if self.is_cancelled(task_id) || !self.transition(task_id, ResearchStatus::Analyzing) {
            return self.snapshot(task_id);
        }
        let ranked = match analyze(findings, &task.options) {
            Ok(ranked) => ranked,
            Err(e) => return Err(self.fail(task_id, e)),
        };

        if !self.transition(task_id, ResearchStatus::Synthesizing) {
            return self.snapshot(task_id);
        }
        let synthesis = match synthesize(&task.topic, &task.questions, &ranked) {
            Ok(synthesis) => synthesis,
            Err(e) => return Err(self.fail(task_id, e)),
        };

        self.update(task_id, |t| {
            t.findings = ranked.clone();
            t.synthesis = Some(synthesis.clone());
        });
        self.cache.insert(
            key,
            CachedResearch {
                findings: ranked,
                synthesis,
            },
        );
        self.transition(task_id, ResearchStatus::Completed);

        let task = self.snapshot(task_id)?;
        tracing::info!(
            "Research '{}' completed with {} findings in {:?}",
            truncate(&task.topic, 60),
            task.findings.len(),
            start.elapsed()
        );
        Ok(task)
    }

    /// Query every enabled, registered source with bounded concurrency.
    /// Failures and timeouts are returned as values.
    async fn gather(
        &self,
        query: &ResearchQuery,
        options: &ResearchOptions,
    ) -> (Vec<Finding>, Vec<(SourceKind, String)>) {
        let sources: Vec<Arc<dyn ResearchSource>> = {
            let registered = self.sources.read();
            options
                .sources
                .iter()
                .filter_map(|kind| registered.get(kind).cloned())
                .collect()
        };
        // A missing flag means the task already reached a terminal state
        let cancelled = self
            .cancellations
            .get(&query.task_id)
            .map(|flag| Arc::clone(flag.value()))
            .unwrap_or_else(|| Arc::new(AtomicBool::new(true)));

        let outcomes: Vec<Option<(SourceKind, Result<Vec<Finding>>)>> = stream::iter(sources)
            .map(|source| {
                let cancelled = Arc::clone(&cancelled);
                async move {
                    // Checked when the unit is dispatched, not mid-flight
                    if cancelled.load(Ordering::SeqCst) {
                        return None;
                    }
                    let kind = source.kind();
                    let result = match tokio::time::timeout(options.timeout, source.gather(query)).await {
                        Ok(result) => result,
                        Err(_) => Err(ContextError::Timeout {
                            operation: format!("{} source", kind.as_str()),
                            elapsed: options.timeout,
                        }),
                    };
                    Some((kind, result))
                }
            })
            .buffer_unordered(self.config.max_concurrent_sources.max(1))
            .collect()
            .await;

        let mut findings = Vec::new();
        let mut errors = Vec::new();
        for (kind, result) in outcomes.into_iter().flatten() {
            match result {
                Ok(found) => {
                    tracing::debug!("Source {} returned {} findings", kind.as_str(), found.len());
                    findings.extend(found);
                }
                Err(e) => {
                    tracing::warn!("Research source {} failed: {}", kind.as_str(), e);
                    errors.push((kind, e.to_string()));
                }
            }
        }
        errors.sort_by_key(|(kind, _)| *kind);
        (findings, errors)
    }

    /// Cancel a task. Returns `false` when it had already finished.
    pub fn cancel_task(&self, task_id: &str) -> Result<bool> {
        let task = self.snapshot(task_id)?;
        if task.status.is_terminal() {
            return Ok(false);
        }
        if let Some(flag) = self.cancellations.get(task_id) {
            flag.store(true, Ordering::SeqCst);
        }
        self.transition(task_id, ResearchStatus::Cancelled);
        tracing::info!("Cancelled research task {}", task_id);
        Ok(true)
    }

    /// Forget a task. An execution still running for it ends with `NotFound`.
    pub fn remove_task(&self, task_id: &str) -> Option<ResearchTask> {
        self.cancellations.remove(task_id);
        self.tasks.remove(task_id).map(|(_, task)| task)
    }

    /// Drop every task in a terminal state; returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !task.status.is_terminal());
        before - self.tasks.len()
    }

    pub fn get_task(&self, task_id: &str) -> Option<ResearchTask> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    /// Every known task, oldest first.
    pub fn list_tasks(&self) -> Vec<ResearchTask> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn snapshot(&self, task_id: &str) -> Result<ResearchTask> {
        self.get_task(task_id)
            .ok_or_else(|| ContextError::not_found("research task", task_id))
    }

    fn update(&self, task_id: &str, f: impl FnOnce(&mut ResearchTask)) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            f(&mut task);
        }
    }

    /// Move a task to a new status. Cancelled tasks stay cancelled; returns
    /// whether the transition happened.
    fn transition(&self, task_id: &str, status: ResearchStatus) -> bool {
        let changed = match self.tasks.get_mut(task_id) {
            Some(mut task) if task.status != ResearchStatus::Cancelled => {
                task.status = status;
                if status.is_terminal() {
                    task.completed_at = Some(SystemTime::now());
                    self.cancellations.remove(task_id);
                }
                true
            }
            _ => false,
        };
        if changed {
            self.publish(EngineEvent::ResearchStatusChanged {
                task_id: task_id.to_string(),
                status,
            });
        }
        changed
    }

    fn fail(&self, task_id: &str, error: ContextError) -> ContextError {
        tracing::warn!("Research task {} failed: {}", task_id, error);
        self.update(task_id, |t| t.error = Some(error.to_string()));
        self.transition(task_id, ResearchStatus::Failed);
        error
    }

    fn is_cancelled(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .is_some_and(|task| task.status == ResearchStatus::Cancelled)
    }

    fn set_state(&self, to: ResearchEngineState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            self.publish(EngineEvent::ResearchEngineStateChanged { from, to });
        }
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn cache_key(topic: &str, questions: &[String]) -> String {
    let mut key = normalize_query(topic);
    for question in questions {
        key.push('\n');
        key.push_str(&normalize_query(question));
    }
    key
}

// ============================================================================
// Analysis & synthesis
// ============================================================================

/// Filter by the relevance/confidence floors, rank by score (newer first on
/// ties, then id) and cap. Non-finite values are an error.
pub fn analyze(findings: Vec<Finding>, options: &ResearchOptions) -> Result<Vec<Finding>> {
    if let Some(bad) = findings
        .iter()
        .find(|f| !f.relevance.is_finite() || !f.confidence.is_finite())
    {
        return Err(ContextError::Computation(format!(
            "finding {} has a non-finite score (relevance {}, confidence {})",
            bad.id, bad.relevance, bad.confidence
        )));
    }

    let mut kept: Vec<Finding> = findings
        .into_iter()
        .filter(|f| f.relevance >= options.min_relevance && f.confidence >= options.min_confidence)
        .collect();

    kept.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
    kept.truncate(options.max_findings);
    Ok(kept)
}

/// Build the synthesis for ranked findings.
pub fn synthesize(topic: &str, questions: &[String], findings: &[Finding]) -> Result<Synthesis> {
    if findings.is_empty() {
        return Ok(Synthesis {
            summary: format!("No findings for '{}'.", topic),
            key_points: Vec::new(),
            insights: Vec::new(),
            recommendations: vec![
                "Broaden the topic or enable more research sources.".to_string(),
            ],
            confidence: 0.0,
        });
    }

    let confidence = findings.iter().map(Finding::score).sum::<f32>() / findings.len() as f32;
    if !confidence.is_finite() {
        return Err(ContextError::Computation(
            "synthesis confidence is not finite".to_string(),
        ));
    }

    let mut by_source: BTreeMap<SourceKind, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        by_source.entry(finding.source).or_default().push(finding);
    }

    let top: Vec<&str> = findings
        .iter()
        .take(SUMMARY_FINDINGS)
        .map(|f| f.title.as_str())
        .collect();
    let summary = format!(
        "Found {} findings for '{}' across {} sources. Most relevant: {}.",
        findings.len(),
        topic,
        by_source.len(),
        top.join("; ")
    );

    let key_points = findings
        .iter()
        .take(KEY_POINTS)
        .map(|f| format!("{}: {}", f.title, first_sentence(&f.content, 160)))
        .collect();

    let insights = by_source
        .iter()
        .filter(|(_, group)| group.len() >= 2)
        .map(|(source, group)| {
            let shared = shared_tags(group);
            let description = if shared.is_empty() {
                format!("{} findings from {} relate to '{}'", group.len(), source.as_str(), topic)
            } else {
                format!(
                    "{} findings from {} share {}",
                    group.len(),
                    source.as_str(),
                    shared.join(", ")
                )
            };
            Insight {
                source: *source,
                description,
                finding_ids: group.iter().map(|f| f.id.clone()).collect(),
                confidence: group.iter().map(|f| f.confidence).sum::<f32>() / group.len() as f32,
            }
        })
        .collect();

    Ok(Synthesis {
        summary,
        key_points,
        insights,
        recommendations: recommendations(questions, findings, &by_source),
        confidence,
    })
}

/// Tags carried by every finding in the group.
fn shared_tags(group: &[&Finding]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for finding in group {
        for tag in &finding.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }
    let mut shared: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n == group.len())
        .map(|(tag, _)| tag.to_string())
        .collect();
    shared.sort();
    shared
}

fn recommendations(
    questions: &[String],
    findings: &[Finding],
    by_source: &BTreeMap<SourceKind, Vec<&Finding>>,
) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(code) = by_source.get(&SourceKind::Code).and_then(|g| g.first()) {
        let target = code
            .location
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| code.title.clone());
        out.push(format!("Start with {}, the most relevant code.", target));
    }
    if let Some(doc) = by_source.get(&SourceKind::Documentation).and_then(|g| g.first()) {
        out.push(format!("Read {} for background.", doc.title));
    }

    // Questions whose terms appear in no finding are still open
    let corpus: String = findings
        .iter()
        .map(|f| format!("{} {}", f.title, f.content).to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    for question in questions {
        let tokens = tokenize(question);
        if !tokens.is_empty() && !tokens.iter().any(|t| t.len() > 3 && corpus.contains(t.as_str())) {
            out.push(format!("Investigate further: {}", question));
        }
    }

    out
}

//! Orchestration and research across a full engine.

use async_trait::async_trait;
use omni_context::research::ResearchQuery;
use omni_context::*;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

struct FailingWeb;

#[async_trait]
impl ResearchSource for FailingWeb {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    async fn gather(&self, _query: &ResearchQuery) -> omni_context::Result<Vec<Finding>> {
        Err(ContextError::Computation("upstream returned 503".to_string()))
    }
}

struct StaticWeb;

#[async_trait]
impl ResearchSource for StaticWeb {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    async fn gather(&self, query: &ResearchQuery) -> omni_context::Result<Vec<Finding>> {
        Ok(vec![Finding {
            id: "web:1".to_string(),
            source: SourceKind::Web,
            title: "Exponential backoff".to_string(),
            content: format!("An article about {}.", query.topic),
            location: None,
            relevance: 0.95,
            confidence: 0.9,
            timestamp: SystemTime::now(),
            tags: vec!["article".to_string()],
        }])
    }
}

async fn engine(config: EngineConfig) -> ContextEngine {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert(
        "/ws/src/retry.ts",
        "export function retryWithBackoff(task, attempts) {\n  // retry the task with backoff\n}\n",
    );
    fs.insert("/ws/src/http.ts", "import { retryWithBackoff } from './retry';\nexport class HttpClient {}\n");
    fs.insert("/ws/docs/retry.md", "# Retries\nEvery retry waits twice as long as the last.\n");
    let engine = ContextEngine::new(config, fs, Arc::new(HashEmbedder::new(128))).unwrap();
    engine.index_repository(Path::new("/ws")).await.unwrap();
    engine
}

fn all_sources() -> EngineConfig {
    EngineConfig {
        research: ResearchConfig {
            sources: vec![SourceKind::Code, SourceKind::Documentation, SourceKind::Memory, SourceKind::Web],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_research_survives_failing_source() {
    let engine = engine(all_sources()).await;
    engine.remember(MemoryNote::new("Retry storms", "Backoff without jitter caused a retry storm"));
    engine.research_engine().register_source(Arc::new(FailingWeb));

    let task = engine
        .research_engine()
        .research("retry backoff", vec!["How long do retries wait?".to_string()], ResearchOverrides::default())
        .await
        .unwrap();

    assert_eq!(task.status, ResearchStatus::Completed);
    assert_eq!(task.source_errors.len(), 1);
    assert_eq!(task.source_errors[0].0, SourceKind::Web);
    assert!(task.source_errors[0].1.contains("503"));
    assert!(task.findings.iter().any(|f| f.source == SourceKind::Code));
    assert!(task.findings.iter().any(|f| f.source == SourceKind::Memory));
    assert!(task.findings.windows(2).all(|w| w[0].score() >= w[1].score()));

    let synthesis = task.synthesis.unwrap();
    assert!(synthesis.confidence > 0.0);
    assert!(!synthesis.key_points.is_empty());
}

#[tokio::test]
async fn test_disabled_source_is_not_queried() {
    let engine = engine(EngineConfig::default()).await;
    engine.research_engine().register_source(Arc::new(FailingWeb));

    let task = engine
        .research_engine()
        .research("retry", vec![], ResearchOverrides::default())
        .await
        .unwrap();
    assert!(task.source_errors.is_empty(), "web is not enabled by default");
}

#[tokio::test]
async fn test_response_ranked_by_tier() {
    let engine = engine(all_sources()).await;
    engine.research_engine().register_source(Arc::new(StaticWeb));

    let response = engine
        .handle_request(
            ContextRequest::new("retry backoff").with_needs([ContextNeed::CodeContext, ContextNeed::Solutions]),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.info.windows(2).all(|w| {
        w[0].importance > w[1].importance
            || (w[0].importance == w[1].importance && w[0].relevance >= w[1].relevance)
    }));
    let web = response.info.iter().find(|i| i.id == "web:1").unwrap();
    assert_eq!(web.importance, Importance::Critical);
    assert_eq!(response.info[0].importance, Importance::Critical);

    let ids: std::collections::HashSet<_> = response.info.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids.len(), response.info.len(), "records are deduplicated");
}

#[tokio::test]
async fn test_cache_hit_short_circuits() {
    let engine = engine(EngineConfig::default()).await;
    let mut events = engine.subscribe();

    let first = engine.handle_request(ContextRequest::new("Retry Backoff")).await.unwrap();
    let second = engine.handle_request(ContextRequest::new("retry   backoff")).await.unwrap();

    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(second.info, first.info);
    assert_ne!(second.request_id, first.request_id);

    let mut started = 0;
    let mut response_hits = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::TaskStarted { .. } => started += 1,
            EngineEvent::CacheHit {
                cache: CacheKind::Response,
                ..
            } => response_hits += 1,
            _ => {}
        }
    }
    assert_eq!(started, 1, "the cached request dispatches nothing");
    assert_eq!(response_hits, 1);

    let stats = engine.orchestrator().stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.successful_requests, 2);
    assert_eq!(stats.cache_hit_rate(), 0.5);
}

#[tokio::test]
async fn test_request_constraints() {
    let engine = engine(EngineConfig::default()).await;
    let response = engine
        .handle_request(
            ContextRequest::new("retry")
                .with_constraints(RequestConstraints {
                    max_results: Some(2),
                    exclude_patterns: vec!["docs/**".to_string()],
                    ..Default::default()
                })
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert!(response.info.len() <= 2);
    assert!(response.info.iter().all(|i| i.kind != InfoKind::Documentation));
}

#[tokio::test]
async fn test_orchestrator_state_events() {
    let engine = engine(EngineConfig::default()).await;
    let mut events = engine.subscribe();
    engine.handle_request(ContextRequest::new("http client")).await.unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::OrchestratorStateChanged { to, .. } = event {
            states.push(to);
        }
    }
    assert_eq!(
        states,
        vec![
            OrchestratorState::Searching,
            OrchestratorState::Synthesizing,
            OrchestratorState::Reporting,
            OrchestratorState::Idle,
        ]
    );
}

#[tokio::test]
async fn test_dense_match_outranks_passing_mention() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("/ws/docs/a.md", "A note that mentions retry once.\n");
    fs.insert("/ws/docs/b.md", "retry ".repeat(8));
    let engine = ContextEngine::new(EngineConfig::default(), fs, Arc::new(HashEmbedder::new(64))).unwrap();
    engine.index_repository(Path::new("/ws")).await.unwrap();

    let response = engine
        .handle_request(ContextRequest::new("retry").with_need(ContextNeed::Documentation))
        .await
        .unwrap();

    let titles: Vec<_> = response.info.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["docs/b.md", "docs/a.md"]);
    assert!(response.info[0].relevance > response.info[1].relevance);
    assert_eq!(response.info[0].importance, Importance::Critical);
    assert!(response.info[1].importance < Importance::Critical);
}

#[tokio::test]
async fn test_research_tasks_are_not_retained() {
    let engine = engine(EngineConfig::default()).await;
    for i in 0..25 {
        let response = engine
            .handle_request(ContextRequest::new(format!("retry backoff {i}")).with_need(ContextNeed::Solutions))
            .await
            .unwrap();
        assert!(response.success);
    }
    assert!(engine.research_engine().list_tasks().is_empty());
}

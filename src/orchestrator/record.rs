//! The common record every search hit, research finding and synthesis is
//! converted into before merging.

use crate::research::{Finding, ResearchTask, SourceKind};
use crate::search::scoring;
use crate::state::RepositoryIndex;
use crate::text::truncate;
use crate::types::{Language, ResultKind, SearchMode, SearchResult, SymbolKind};
use serde::Serialize;
use std::path::PathBuf;
use std::time::SystemTime;

/// Confidence assigned to search hits; the index content is authoritative.
const SEARCH_CONFIDENCE: f32 = 0.9;

/// Coarse ranking bucket, the primary key when merging results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Importance {
    pub fn from_relevance(relevance: f32) -> Self {
        if relevance >= 0.85 {
            Self::Critical
        } else if relevance >= 0.65 {
            Self::High
        } else if relevance >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Context window priority for records of this tier.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Critical => 100,
            Self::High => 75,
            Self::Medium => 50,
            Self::Low => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoKind {
    Code,
    Symbol,
    Documentation,
    Finding,
    Synthesis,
}

/// Provenance details, one variant per producer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InfoMetadata {
    Search {
        mode: SearchMode,
        score: f32,
        path: Option<PathBuf>,
        line: Option<usize>,
        symbol_kind: Option<SymbolKind>,
        language: Option<Language>,
    },
    Research {
        task_id: String,
        source: SourceKind,
        location: Option<PathBuf>,
    },
    Synthesis {
        task_id: String,
        finding_count: usize,
        key_points: Vec<String>,
        recommendations: Vec<String>,
    },
}

/// One merged piece of context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextInfo {
    pub id: String,
    pub kind: InfoKind,
    pub title: String,
    /// `detail` cut to the configured summary length
    pub summary: String,
    pub detail: String,
    pub source: String,
    pub confidence: f32,
    pub relevance: f32,
    pub importance: Importance,
    pub timestamp: SystemTime,
    pub tags: Vec<String>,
    pub metadata: InfoMetadata,
}

impl ContextInfo {
    pub fn from_search(
        result: SearchResult,
        mode: SearchMode,
        tags: Vec<String>,
        index: &RepositoryIndex,
        summary_length: usize,
    ) -> Self {
        let relevance = scoring::relevance(mode, result.score);
        let file = result.file.as_ref();
        let language = file.map(|f| f.language);

        let (kind, title) = match (&result.kind, &result.symbol) {
            (ResultKind::Symbol, Some(symbol)) => {
                (InfoKind::Symbol, format!("{} {}", symbol.kind.as_str(), symbol.name))
            }
            _ => {
                let title = file
                    .map(|f| index.relative_path(&f.path).display().to_string())
                    .unwrap_or_else(|| result.id.clone());
                let kind = if language.is_some_and(|l| l.is_documentation()) {
                    InfoKind::Documentation
                } else {
                    InfoKind::Code
                };
                (kind, title)
            }
        };

        let detail = result.content.clone().unwrap_or_default();
        let mut tags = tags;
        if let Some(language) = language {
            tags.push(language.as_str().to_string());
        }

        Self {
            summary: truncate(&detail, summary_length),
            detail,
            kind,
            title,
            source: format!("search:{}", mode.as_str()),
            confidence: SEARCH_CONFIDENCE,
            relevance,
            importance: Importance::from_relevance(relevance),
            timestamp: file.and_then(|f| f.modified).unwrap_or(SystemTime::UNIX_EPOCH),
            tags,
            metadata: InfoMetadata::Search {
                mode,
                score: result.score,
                path: file.map(|f| f.path.clone()),
                line: result.location.as_ref().map(|l| l.start_line),
                symbol_kind: result.symbol.as_ref().map(|s| s.kind),
                language,
            },
            id: result.id,
        }
    }

    pub fn from_finding(finding: Finding, task_id: &str, summary_length: usize) -> Self {
        Self {
            id: finding.id,
            kind: InfoKind::Finding,
            title: finding.title,
            summary: truncate(&finding.content, summary_length),
            detail: finding.content,
            source: format!("research:{}", finding.source.as_str()),
            confidence: finding.confidence,
            relevance: finding.relevance,
            importance: Importance::from_relevance(finding.relevance),
            timestamp: finding.timestamp,
            tags: finding.tags,
            metadata: InfoMetadata::Research {
                task_id: task_id.to_string(),
                source: finding.source,
                location: finding.location,
            },
        }
    }

    /// The task's synthesis as a record, when it has one.
    pub fn from_synthesis(task: &ResearchTask, summary_length: usize) -> Option<Self> {
        let synthesis = task.synthesis.as_ref()?;
        let mut detail = synthesis.summary.clone();
        for point in &synthesis.key_points {
            detail.push_str("\n- ");
            detail.push_str(point);
        }

        Some(Self {
            id: format!("synthesis:{}", task.id),
            kind: InfoKind::Synthesis,
            title: format!("Research: {}", task.topic),
            summary: truncate(&synthesis.summary, summary_length),
            detail,
            source: "research:synthesis".to_string(),
            confidence: synthesis.confidence,
            relevance: synthesis.confidence,
            importance: Importance::from_relevance(synthesis.confidence),
            timestamp: task.completed_at.unwrap_or(task.created_at),
            tags: vec!["synthesis".to_string()],
            metadata: InfoMetadata::Synthesis {
                task_id: task.id.clone(),
                finding_count: task.findings.len(),
                key_points: synthesis.key_points.clone(),
                recommendations: synthesis.recommendations.clone(),
            },
        })
    }
}

/// Deduplicate by id (highest relevance wins), then order by tier, relevance
/// descending, newer timestamp, and id; keep at most `max_results`.
pub fn merge(records: Vec<ContextInfo>, max_results: usize) -> Vec<ContextInfo> {
    let mut best: std::collections::HashMap<String, ContextInfo> = std::collections::HashMap::new();
    for record in records {
        match best.get(&record.id) {
            Some(existing) if existing.relevance >= record.relevance => {}
            _ => {
                best.insert(record.id.clone(), record);
            }
        }
    }

    let mut merged: Vec<ContextInfo> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then_with(|| b.relevance.total_cmp(&a.relevance))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(max_results);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn record(id: &str, relevance: f32, age_secs: u64) -> ContextInfo {
        ContextInfo {
            id: id.to_string(),
            kind: InfoKind::Code,
            title: id.to_string(),
            summary: String::new(),
            detail: String::new(),
            source: "test".to_string(),
            confidence: 1.0,
            relevance,
            importance: Importance::from_relevance(relevance),
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 - age_secs),
            tags: Vec::new(),
            metadata: InfoMetadata::Research {
                task_id: "t".to_string(),
                source: SourceKind::Memory,
                location: None,
            },
        }
    }

    #[test]
    fn test_importance_tiers() {
        assert_eq!(Importance::from_relevance(0.9), Importance::Critical);
        assert_eq!(Importance::from_relevance(0.65), Importance::High);
        assert_eq!(Importance::from_relevance(0.5), Importance::Medium);
        assert_eq!(Importance::from_relevance(0.1), Importance::Low);
        assert!(Importance::Critical > Importance::Low);
        assert!(Importance::High.priority() > Importance::Medium.priority());
    }

    #[test]
    fn test_merge_orders_by_tier_then_relevance() {
        let merged = merge(
            vec![
                record("low", 0.2, 0),
                record("critical", 0.9, 0),
                record("medium-a", 0.5, 0),
                record("medium-b", 0.6, 0),
            ],
            10,
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["critical", "medium-b", "medium-a", "low"]);
    }

    #[test]
    fn test_merge_dedupes_keeping_most_relevant() {
        let merged = merge(vec![record("x", 0.5, 0), record("x", 0.7, 0), record("x", 0.6, 0)], 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].relevance, 0.7);
    }

    #[test]
    fn test_merge_ties_prefer_newer_then_id() {
        let merged = merge(
            vec![record("b", 0.5, 10), record("c", 0.5, 0), record("a", 0.5, 10)],
            2,
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}

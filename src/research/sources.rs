//! Built-in research sources.
//!
//! Code and documentation findings come from the shared [`SearchEngine`];
//! memory findings come from notes recorded by the caller. Web sources are
//! not built in and must be registered by the embedding application.

use super::{Finding, ResearchQuery, ResearchSource, SourceKind};
use crate::error::Result;
use crate::search::SearchEngine;
use crate::search::scoring::saturate;
use crate::text::{tokenize, truncate};
use crate::types::{Language, ResultKind, SearchFilter, SearchMode, SearchQuery, SearchResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

const CODE_CONFIDENCE: f32 = 0.8;
const DOCUMENTATION_CONFIDENCE: f32 = 0.7;
const MEMORY_CONFIDENCE: f32 = 0.6;

/// Characters of content carried by each finding.
const FINDING_CONTENT_CHARS: usize = 600;

fn search_query(query: &ResearchQuery, mode: SearchMode, languages: Vec<Language>) -> SearchQuery {
    SearchQuery::new(query.text(), mode)
        .with_top_k(query.breadth.clamp(1, SearchQuery::MAX_TOP_K))
        .with_filters(SearchFilter {
            languages,
            ..Default::default()
        })
        .with_content()
}

fn finding_from_result(
    source: SourceKind,
    result: SearchResult,
    title: String,
    confidence: f32,
) -> Finding {
    let file = result.file.as_ref();
    let mut tags = Vec::new();
    if let Some(file) = file {
        tags.push(file.language.as_str().to_string());
    }
    if let Some(symbol) = &result.symbol {
        tags.push(symbol.kind.as_str().to_string());
    }

    Finding {
        id: format!("{}:{}", source.as_str(), result.id),
        source,
        title,
        content: truncate(result.content.as_deref().unwrap_or_default(), FINDING_CONTENT_CHARS),
        location: file.map(|f| f.path.clone()),
        relevance: saturate(result.score),
        confidence,
        timestamp: file.and_then(|f| f.modified).unwrap_or(SystemTime::UNIX_EPOCH),
        tags,
    }
}

/// Hybrid search over source files.
pub struct CodeSource {
    search: Arc<SearchEngine>,
}

impl CodeSource {
    pub fn new(search: Arc<SearchEngine>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl ResearchSource for CodeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Code
    }

    async fn gather(&self, query: &ResearchQuery) -> Result<Vec<Finding>> {
        let results = self
            .search
            .search(&search_query(query, SearchMode::Hybrid, Language::code()))
            .await?;
        let index = self.search.index();

        Ok(results
            .into_iter()
            .map(|result| {
                let title = match (&result.kind, &result.symbol, &result.file) {
                    (ResultKind::Symbol, Some(symbol), _) => {
                        format!("{} {}", symbol.kind.as_str(), symbol.name)
                    }
                    (_, _, Some(file)) => index.relative_path(&file.path).display().to_string(),
                    _ => result.id.clone(),
                };
                finding_from_result(SourceKind::Code, result, title, CODE_CONFIDENCE)
            })
            .collect())
    }
}

/// Keyword search over markdown and plain-text files.
pub struct DocumentationSource {
    search: Arc<SearchEngine>,
}

impl DocumentationSource {
    pub fn new(search: Arc<SearchEngine>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl ResearchSource for DocumentationSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Documentation
    }

    async fn gather(&self, query: &ResearchQuery) -> Result<Vec<Finding>> {
        let results = self
            .search
            .search(&search_query(query, SearchMode::Keyword, Language::documentation()))
            .await?;
        let index = self.search.index();

        Ok(results
            .into_iter()
            .map(|result| {
                let path_title = result
                    .file
                    .as_ref()
                    .map(|f| index.relative_path(&f.path).display().to_string())
                    .unwrap_or_else(|| result.id.clone());
                // Prefer the first markdown heading
                let title = result
                    .content
                    .as_deref()
                    .and_then(|c| c.lines().find_map(|l| l.trim().strip_prefix('#')))
                    .map(|h| h.trim_start_matches('#').trim().to_string())
                    .filter(|h| !h.is_empty())
                    .unwrap_or(path_title);
                finding_from_result(SourceKind::Documentation, result, title, DOCUMENTATION_CONFIDENCE)
            })
            .collect())
    }
}

/// A note remembered from earlier work.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNote {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: SystemTime,
}

impl MemoryNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            created_at: SystemTime::now(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// In-memory notes matched by token overlap with the query.
#[derive(Default)]
pub struct MemorySource {
    notes: RwLock<Vec<MemoryNote>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_note(&self, note: MemoryNote) {
        self.notes.write().push(note);
    }

    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }
}

#[async_trait]
impl ResearchSource for MemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    async fn gather(&self, query: &ResearchQuery) -> Result<Vec<Finding>> {
        let wanted: HashSet<String> = tokenize(&query.text()).into_iter().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut findings: Vec<Finding> = self
            .notes
            .read()
            .iter()
            .filter_map(|note| {
                let text = format!("{} {} {}", note.title, note.content, note.tags.join(" "));
                let have: HashSet<String> = tokenize(&text).into_iter().collect();
                let matched = wanted.intersection(&have).count();
                if matched == 0 {
                    return None;
                }
                Some(Finding {
                    id: format!("memory:{}", note.id),
                    source: SourceKind::Memory,
                    title: note.title.clone(),
                    content: truncate(&note.content, FINDING_CONTENT_CHARS),
                    location: None,
                    relevance: matched as f32 / wanted.len() as f32,
                    confidence: MEMORY_CONFIDENCE,
                    timestamp: note.created_at,
                    tags: note.tags.clone(),
                })
            })
            .collect();

        findings.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then_with(|| a.id.cmp(&b.id)));
        findings.truncate(query.breadth.max(1));
        Ok(findings)
    }
}

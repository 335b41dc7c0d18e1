//! Scoring strategies. Each one reads the index synchronously and returns
//! unsorted candidates.

use crate::embedding::cosine_similarity;
use crate::state::RepositoryIndex;
use crate::text::tokenize;
use crate::types::{FileId, Highlight, SearchMode, SymbolId};
use regex::Regex;
use std::collections::HashMap;

/// Weight of the semantic term in hybrid fusion.
pub const SEMANTIC_WEIGHT: f32 = 0.6;
/// Weight of the keyword term in hybrid fusion.
pub const KEYWORD_WEIGHT: f32 = 0.4;

pub const EXACT_SYMBOL_SCORE: f32 = 1.0;
pub const PARTIAL_SYMBOL_SCORE: f32 = 0.7;

/// Highlights kept per regex result.
pub const MAX_HIGHLIGHTS: usize = 20;

/// Map an unbounded, non-negative score into `0..1`.
pub fn saturate(score: f32) -> f32 {
    1.0 - (-score.max(0.0)).exp()
}

/// A result score as a `0..1` relevance. Semantic and symbol scores are
/// already bounded; keyword, regex and hybrid scores grow with occurrences.
pub fn relevance(mode: SearchMode, score: f32) -> f32 {
    match mode {
        SearchMode::Semantic | SearchMode::Symbol => score.clamp(0.0, 1.0),
        SearchMode::Keyword | SearchMode::Regex | SearchMode::Hybrid => saturate(score),
    }
}

/// What a candidate points at. Ordering breaks score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    File(FileId),
    Symbol(SymbolId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub target: Target,
    pub score: f32,
    pub highlights: Vec<Highlight>,
}

impl Scored {
    fn new(target: Target, score: f32) -> Self {
        Self {
            target,
            score,
            highlights: Vec::new(),
        }
    }
}

/// Cosine similarity between the query vector and every file embedding.
///
/// Candidates with no similarity at all are dropped even when `min_score` is 0.
pub fn semantic(index: &RepositoryIndex, query: &[f32], min_score: f32) -> Vec<Scored> {
    index
        .embeddings()
        .into_iter()
        .filter_map(|(file_id, embedding)| {
            let score = cosine_similarity(query, &embedding);
            (score > 0.0 && score >= min_score).then(|| Scored::new(Target::File(file_id), score))
        })
        .collect()
}

/// Occurrences of each query token in the lowercased content, averaged over
/// the number of tokens.
pub fn keyword(index: &RepositoryIndex, query: &str) -> Vec<Scored> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    index
        .files()
        .into_iter()
        .filter_map(|file| {
            let content = file.content.to_lowercase();
            let occurrences: usize = tokens.iter().map(|t| content.matches(t.as_str()).count()).sum();
            let score = occurrences as f32 / tokens.len() as f32;
            (score > 0.0).then(|| Scored::new(Target::File(file.id), score))
        })
        .collect()
}

/// Exact name-index hits score 1.0; case-insensitive substring matches 0.7.
pub fn symbol(index: &RepositoryIndex, query: &str) -> Vec<Scored> {
    let name = query.trim();
    let needle = name.to_lowercase();

    let mut results: Vec<Scored> = index
        .find_by_name(name)
        .into_iter()
        .map(|s| Scored::new(Target::Symbol(s.id), EXACT_SYMBOL_SCORE))
        .collect();

    for symbol in index.symbols() {
        if symbol.name != name && symbol.name.to_lowercase().contains(&needle) {
            results.push(Scored::new(Target::Symbol(symbol.id), PARTIAL_SYMBOL_SCORE));
        }
    }

    results
}

/// Match count over raw content, with line-level highlight spans.
pub fn regex(index: &RepositoryIndex, pattern: &Regex) -> Vec<Scored> {
    index
        .files()
        .into_iter()
        .filter_map(|file| {
            let (count, highlights) = regex_matches(&file.content, pattern);
            (count > 0).then(|| Scored {
                target: Target::File(file.id),
                score: count as f32,
                highlights,
            })
        })
        .collect()
}

fn regex_matches(content: &str, pattern: &Regex) -> (usize, Vec<Highlight>) {
    let bytes = content.as_bytes();
    let mut count = 0;
    let mut highlights = Vec::new();

    // Line tracking advances monotonically with the matches.
    let mut line = 1;
    let mut line_start = 0;
    let mut scanned = 0;

    for m in pattern.find_iter(content) {
        if m.start() == m.end() {
            continue;
        }
        count += 1;
        if highlights.len() >= MAX_HIGHLIGHTS {
            continue;
        }

        let newlines = bytecount::count(&bytes[scanned..m.start()], b'\n');
        if newlines > 0 {
            line += newlines;
            line_start = content[..m.start()].rfind('\n').map_or(0, |i| i + 1);
        }
        scanned = m.start();

        let line_end = content[line_start..]
            .find('\n')
            .map_or(content.len(), |i| line_start + i);
        let end = m.end().min(line_end);

        highlights.push(Highlight {
            line,
            start_col: m.start() - line_start + 1,
            end_col: end - line_start + 1,
            text: content[line_start..line_end].trim_end_matches('\r').to_string(),
        });
    }

    (count, highlights)
}

/// Weighted fusion of semantic and keyword candidates, deduplicated by
/// target. A target found by both gets the sum of both weighted terms.
pub fn fuse_hybrid(semantic: Vec<Scored>, keyword: Vec<Scored>) -> Vec<Scored> {
    let mut scores: HashMap<Target, f32> = HashMap::new();

    for s in semantic {
        *scores.entry(s.target).or_insert(0.0) += SEMANTIC_WEIGHT * s.score;
    }
    for k in keyword {
        *scores.entry(k.target).or_insert(0.0) += KEYWORD_WEIGHT * k.score;
    }

    scores
        .into_iter()
        .map(|(target, score)| Scored::new(target, score))
        .collect()
}

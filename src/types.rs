//! Core types for the context engine.
//!
//! This module defines the data structures shared across layers:
//! - Repository entries (files, symbols, locations)
//! - Search queries, filters and results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Unique identifier for files in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// Unique identifier for symbols in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "symbol:{}", self.0)
    }
}

// ============================================================================
// Repository Types
// ============================================================================

/// Source language, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Rust,
    Python,
    Go,
    Java,
    Markdown,
    Json,
    Yaml,
    Toml,
    Text,
    Other,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Other;
        };
        match ext.to_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rs" => Self::Rust,
            "py" => Self::Python,
            "go" => Self::Go,
            "java" => Self::Java,
            "md" | "markdown" | "mdx" => Self::Markdown,
            "json" => Self::Json,
            "yml" | "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "txt" | "rst" | "adoc" => Self::Text,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Python => "python",
            Self::Go => "go",
            Self::Java => "java",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Text => "text",
            Self::Other => "other",
        }
    }

    /// Languages that hold prose rather than code.
    pub fn is_documentation(&self) -> bool {
        matches!(self, Self::Markdown | Self::Text)
    }

    pub fn documentation() -> Vec<Language> {
        vec![Self::Markdown, Self::Text]
    }

    /// Languages with declarations worth extracting.
    pub fn code() -> Vec<Language> {
        vec![
            Self::TypeScript,
            Self::JavaScript,
            Self::Rust,
            Self::Python,
            Self::Go,
            Self::Java,
        ]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of symbol declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Const,
    Let,
    Var,
    TypeAlias,
    Enum,
    Struct,
    Trait,
    Static,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Function => "function",
            Self::Const => "const",
            Self::Let => "let",
            Self::Var => "var",
            Self::TypeAlias => "type",
            Self::Enum => "enum",
            Self::Struct => "struct",
            Self::Trait => "trait",
            Self::Static => "static",
            Self::Module => "module",
        }
    }
}

/// Location of a declaration in a file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file_id: FileId,
    pub path: PathBuf,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/// One indexed file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: FileId,
    pub path: PathBuf,
    pub content: Arc<str>,
    pub language: Language,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub embedding: Option<Arc<[f32]>>,
    pub symbols: Vec<SymbolId>,
    /// Identifiers brought in by import statements
    pub imports: Vec<String>,
    /// Identifiers made visible to other files
    pub exports: Vec<String>,
    pub indexed_at: SystemTime,
    pub access_count: u64,
    pub last_accessed: Option<SystemTime>,
}

impl FileEntry {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            path: self.path.clone(),
            language: self.language,
            size: self.size,
            modified: self.modified,
        }
    }
}

/// Lightweight view of a file, without its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: FileId,
    pub path: PathBuf,
    pub language: Language,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A named code construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    /// Whether the declaration is visible outside its file
    pub exported: bool,
    /// The declaration line as written
    pub signature: String,
}

// ============================================================================
// Search Types
// ============================================================================

/// Retrieval strategy for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Symbol,
    Regex,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Symbol => "symbol",
            Self::Regex => "regex",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "symbol" => Ok(Self::Symbol),
            "regex" => Ok(Self::Regex),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "unknown search mode '{}': use semantic, keyword, symbol, regex or hybrid",
                other
            )),
        }
    }
}

/// Inclusive time window applied to file modification times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<SystemTime>,
    pub end: Option<SystemTime>,
}

impl TimeRange {
    pub fn contains(&self, time: SystemTime) -> bool {
        self.start.is_none_or(|s| time >= s) && self.end.is_none_or(|e| time <= e)
    }
}

/// Post-scoring filters for a search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Glob the file path must match (e.g. `**/*.ts`)
    pub file_pattern: Option<String>,
    pub languages: Vec<Language>,
    pub symbol_kinds: Vec<SymbolKind>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub time_range: Option<TimeRange>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub mode: SearchMode,
    pub filters: Option<SearchFilter>,
    pub top_k: usize,
    pub min_score: f32,
    pub include_content: bool,
}

impl SearchQuery {
    pub const MAX_TOP_K: usize = 100;

    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            filters: None,
            top_k: 10,
            min_score: 0.0,
            include_content: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilter) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_content(mut self) -> Self {
        self.include_content = true;
        self
    }
}

/// What a search result points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    File,
    Symbol,
}

/// A line-level match span. Columns are 1-based, `end_col` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub text: String,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub kind: ResultKind,
    pub score: f32,
    pub content: Option<String>,
    pub location: Option<Location>,
    pub symbol: Option<SymbolEntry>,
    pub file: Option<FileSummary>,
    pub highlights: Vec<Highlight>,
}

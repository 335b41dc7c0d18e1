//! Parsing module for extracting symbols from source code.
//!
//! Extraction is pattern based: each language family has a table of
//! declaration, import and export patterns that are matched line by line.
//! This keeps indexing fast and tolerant of code that does not parse.

pub mod patterns;

use crate::types::{Language, SymbolKind};

pub use patterns::PatternExtractor;

/// Which parts of a file to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub symbols: bool,
    pub imports: bool,
    pub exports: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            symbols: true,
            imports: true,
            exports: true,
        }
    }
}

/// A declaration found in source text. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
    pub exported: bool,
    pub signature: String,
}

/// Everything extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub symbols: Vec<ExtractedSymbol>,
    /// Imported identifiers, deduplicated, in order of appearance
    pub imports: Vec<String>,
    /// Exported identifiers, deduplicated, in order of appearance
    pub exports: Vec<String>,
}

/// Trait for symbol extractors.
pub trait SymbolExtractor: Send + Sync {
    fn extract(&self, source: &str, language: Language, options: ExtractOptions) -> Extraction;
}

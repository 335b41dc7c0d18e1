//! Post-scoring filters.

use super::scoring::{Scored, Target};
use crate::discovery::build_globset;
use crate::error::Result;
use crate::state::RepositoryIndex;
use crate::types::{FileEntry, Language, SearchFilter, SymbolEntry, SymbolKind, TimeRange};
use globset::GlobSet;

/// A [`SearchFilter`] with its globs compiled.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    file_pattern: Option<GlobSet>,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    languages: Vec<Language>,
    symbol_kinds: Vec<SymbolKind>,
    time_range: Option<TimeRange>,
}

impl CompiledFilter {
    pub fn compile(filter: &SearchFilter) -> Result<Self> {
        let file_pattern = filter
            .file_pattern
            .as_deref()
            .map(|p| build_globset([p]))
            .transpose()?;

        Ok(Self {
            file_pattern,
            include: optional_globset(&filter.include_paths)?,
            exclude: optional_globset(&filter.exclude_paths)?,
            languages: filter.languages.clone(),
            symbol_kinds: filter.symbol_kinds.clone(),
            time_range: filter.time_range,
        })
    }

    /// Whether a candidate survives the filter. Candidates whose file has
    /// gone missing never do.
    pub fn matches(&self, index: &RepositoryIndex, candidate: &Scored) -> bool {
        match candidate.target {
            Target::File(id) => index
                .get_file(id)
                .is_some_and(|file| self.matches_file(index, &file, None)),
            Target::Symbol(id) => {
                let Some(symbol) = index.get_symbol(id) else {
                    return false;
                };
                index
                    .get_file(symbol.location.file_id)
                    .is_some_and(|file| self.matches_file(index, &file, Some(&symbol)))
            }
        }
    }

    fn matches_file(&self, index: &RepositoryIndex, file: &FileEntry, symbol: Option<&SymbolEntry>) -> bool {
        let rel = index.relative_path(&file.path);
        let glob_match = |set: &GlobSet| set.is_match(&rel) || set.is_match(&file.path);

        if let Some(set) = &self.file_pattern {
            if !glob_match(set) {
                return false;
            }
        }
        if let Some(set) = &self.include {
            if !glob_match(set) {
                return false;
            }
        }
        if let Some(set) = &self.exclude {
            if glob_match(set) {
                return false;
            }
        }

        if !self.languages.is_empty() && !self.languages.contains(&file.language) {
            return false;
        }

        if !self.symbol_kinds.is_empty() {
            let kind_matches = match symbol {
                Some(symbol) => self.symbol_kinds.contains(&symbol.kind),
                // A file qualifies when it declares at least one symbol of a listed kind
                None => index
                    .symbols_for_file(file.id)
                    .iter()
                    .any(|s| self.symbol_kinds.contains(&s.kind)),
            };
            if !kind_matches {
                return false;
            }
        }

        if let Some(range) = &self.time_range {
            match file.modified {
                Some(modified) if range.contains(modified) => {}
                _ => return false,
            }
        }

        true
    }
}

fn optional_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    build_globset(patterns.iter().map(|s| s.as_str())).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::ExtractedSymbol;
    use crate::state::FileDraft;
    use crate::types::FileId;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn add(index: &RepositoryIndex, path: &str, kind: Option<SymbolKind>, modified: Option<SystemTime>) -> FileId {
        let path = PathBuf::from(path);
        index.upsert_file(FileDraft {
            language: Language::from_path(&path),
            path,
            content: Arc::from("x"),
            size: 1,
            modified,
            embedding: None,
            symbols: kind
                .map(|kind| ExtractedSymbol {
                    name: "sym".to_string(),
                    kind,
                    start_line: 1,
                    start_col: 1,
                    end_line: 1,
                    end_col: 4,
                    exported: false,
                    signature: String::new(),
                })
                .into_iter()
                .collect(),
            imports: Vec::new(),
            exports: Vec::new(),
        })
    }

    fn file(id: FileId) -> Scored {
        Scored {
            target: Target::File(id),
            score: 1.0,
            highlights: Vec::new(),
        }
    }

    #[test]
    fn test_path_and_language_filters() {
        let index = RepositoryIndex::new();
        index.set_root(PathBuf::from("/repo"));
        let ts = add(&index, "/repo/src/a.ts", None, None);
        let md = add(&index, "/repo/docs/guide.md", None, None);
        let gen_ts = add(&index, "/repo/src/generated/b.ts", None, None);

        let filter = CompiledFilter::compile(&SearchFilter {
            file_pattern: Some("**/*.ts".to_string()),
            exclude_paths: vec!["src/generated/**".to_string()],
            ..Default::default()
        })
        .unwrap();
        assert!(filter.matches(&index, &file(ts)));
        assert!(!filter.matches(&index, &file(md)));
        assert!(!filter.matches(&index, &file(gen_ts)));

        let docs = CompiledFilter::compile(&SearchFilter {
            languages: Language::documentation(),
            ..Default::default()
        })
        .unwrap();
        assert!(docs.matches(&index, &file(md)));
        assert!(!docs.matches(&index, &file(ts)));
    }

    #[test]
    fn test_symbol_kind_filter_on_files() {
        let index = RepositoryIndex::new();
        let class_file = add(&index, "/r/a.ts", Some(SymbolKind::Class), None);
        let fn_file = add(&index, "/r/b.ts", Some(SymbolKind::Function), None);

        let filter = CompiledFilter::compile(&SearchFilter {
            symbol_kinds: vec![SymbolKind::Class],
            ..Default::default()
        })
        .unwrap();
        assert!(filter.matches(&index, &file(class_file)));
        assert!(!filter.matches(&index, &file(fn_file)));
    }

    #[test]
    fn test_time_range_excludes_unknown_mtime() {
        let index = RepositoryIndex::new();
        let now = SystemTime::now();
        let recent = add(&index, "/r/a.ts", None, Some(now));
        let old = add(&index, "/r/b.ts", None, Some(now - Duration::from_secs(86_400)));
        let unknown = add(&index, "/r/c.ts", None, None);

        let filter = CompiledFilter::compile(&SearchFilter {
            time_range: Some(TimeRange {
                start: Some(now - Duration::from_secs(60)),
                end: None,
            }),
            ..Default::default()
        })
        .unwrap();
        assert!(filter.matches(&index, &file(recent)));
        assert!(!filter.matches(&index, &file(old)));
        assert!(!filter.matches(&index, &file(unknown)));
    }
}

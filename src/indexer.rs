//! Repository indexer.
//!
//! Walks a root through the [`FileSystem`] provider, extracts declarations,
//! imports and exports, embeds each file and writes the results into a
//! [`RepositoryIndex`]. Passes are incremental: files whose size and
//! modification time are unchanged are not re-read, and files that vanished
//! since the last pass are removed.

use crate::config::IndexConfig;
use crate::discovery::{DiscoveredFile, FileDiscovery};
use crate::embedding::Embedder;
use crate::error::{ContextError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::fs::{FileStat, FileSystem};
use crate::parsing::{ExtractOptions, PatternExtractor, SymbolExtractor};
use crate::state::{FileDraft, RepositoryIndex};
use crate::types::{FileId, Language};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of one indexing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub root: PathBuf,
    /// Files that passed discovery
    pub discovered: usize,
    /// Files (re)written into the index
    pub indexed: usize,
    /// Files already indexed with the same size and modification time
    pub unchanged: usize,
    /// Listed files rejected by patterns or size
    pub skipped: usize,
    /// Files that could not be read or embedded, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Previously indexed files that no longer exist
    pub removed: usize,
    pub duration: Duration,
}

/// Populates a [`RepositoryIndex`] from a workspace.
pub struct Indexer {
    config: IndexConfig,
    discovery: FileDiscovery,
    fs: Arc<dyn FileSystem>,
    embedder: Arc<dyn Embedder>,
    extractor: Box<dyn SymbolExtractor>,
    events: Option<EventBus>,
}

impl Indexer {
    pub fn new(
        config: IndexConfig,
        fs: Arc<dyn FileSystem>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(ContextError::validation("worker_count", "must be at least 1"));
        }
        Ok(Self {
            discovery: FileDiscovery::from_config(&config)?,
            config,
            fs,
            embedder,
            extractor: Box::new(PatternExtractor::new()),
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the default pattern extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn SymbolExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Perform an indexing pass over the repository.
    ///
    /// A failure on one file is logged and recorded in the report; the pass
    /// itself only fails when the root cannot be listed.
    pub async fn index_repository(&self, index: &RepositoryIndex, root: &Path) -> Result<IndexReport> {
        let start = Instant::now();
        tracing::info!("Starting index of {}", root.display());

        let discovered = self.discovery.discover(self.fs.as_ref(), root).await?;
        let total = discovered.files.len();
        tracing::info!("Discovered {} files ({} skipped)", total, discovered.skipped);

        index.set_root(root.to_path_buf());

        let mut report = IndexReport {
            root: root.to_path_buf(),
            discovered: total,
            skipped: discovered.skipped,
            ..Default::default()
        };

        let pending: Vec<&DiscoveredFile> = discovered
            .files
            .iter()
            .filter(|file| {
                let unchanged = is_unchanged(index, file);
                if unchanged {
                    report.unchanged += 1;
                }
                !unchanged
            })
            .collect();

        let mut processed = report.unchanged;
        for batch in pending.chunks(self.config.worker_count) {
            let results = join_all(batch.iter().map(|file| self.prepare(&file.path, file.stat))).await;

            for (file, result) in batch.iter().zip(results) {
                match result {
                    Ok(draft) => {
                        index.upsert_file(draft);
                        report.indexed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to index {}: {}", file.path.display(), e);
                        report.failed.push((file.path.clone(), e.to_string()));
                    }
                }
            }

            processed += batch.len();
            self.publish(EngineEvent::IndexProgress { processed, total });
        }

        // Prune files that disappeared since the last pass
        let live: HashSet<&Path> = discovered.files.iter().map(|f| f.path.as_path()).collect();
        for path in index.paths() {
            if path.starts_with(root) && !live.contains(path.as_path()) && index.remove_file(&path).is_some()
            {
                tracing::debug!("Removed vanished file {}", path.display());
                report.removed += 1;
            }
        }

        index.mark_indexed();
        report.duration = start.elapsed();

        let stats = index.stats();
        tracing::info!(
            "Index complete: {} files, {} symbols, {} failed, {} removed in {:?}",
            stats.file_count,
            stats.symbol_count,
            report.failed.len(),
            report.removed,
            report.duration
        );

        self.publish(EngineEvent::IndexCompleted {
            indexed: report.indexed,
            failed: report.failed.len(),
            removed: report.removed,
        });

        Ok(report)
    }

    /// Index a single file, replacing any previous data for its path.
    pub async fn index_file(&self, index: &RepositoryIndex, path: &Path) -> Result<FileId> {
        let stat = self.fs.stat(path).await?;
        if stat.size > self.discovery.max_file_size() {
            return Err(ContextError::validation(
                "path",
                format!(
                    "{} is {} bytes, above the {} byte limit",
                    path.display(),
                    stat.size,
                    self.discovery.max_file_size()
                ),
            ));
        }
        let draft = self.prepare(path, stat).await?;
        Ok(index.upsert_file(draft))
    }

    /// Re-read a changed file.
    pub async fn update_file(&self, index: &RepositoryIndex, path: &Path) -> Result<FileId> {
        self.index_file(index, path).await
    }

    /// Remove a file from the index. Returns whether it was present.
    pub fn remove_file(&self, index: &RepositoryIndex, path: &Path) -> bool {
        index.remove_file(path).is_some()
    }

    /// Read, extract and embed one file.
    async fn prepare(&self, path: &Path, stat: FileStat) -> Result<FileDraft> {
        let content = self.fs.read_to_string(path).await?;
        let language = Language::from_path(path);

        let extraction = self.extractor.extract(
            &content,
            language,
            ExtractOptions {
                symbols: self.config.extract_symbols,
                imports: self.config.extract_imports,
                exports: self.config.extract_exports,
            },
        );

        let embedding = if self.config.generate_embeddings {
            let text = format!("{}\n{}", path.display(), content);
            Some(Arc::from(self.embedder.embed(&text).await?))
        } else {
            None
        };

        Ok(FileDraft {
            path: path.to_path_buf(),
            size: content.len() as u64,
            content: Arc::from(content),
            language,
            modified: stat.modified,
            embedding,
            symbols: extraction.symbols,
            imports: extraction.imports,
            exports: extraction.exports,
        })
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn is_unchanged(index: &RepositoryIndex, file: &DiscoveredFile) -> bool {
    match (index.file_by_path(&file.path), file.stat.modified) {
        (Some(entry), Some(modified)) => {
            entry.modified == Some(modified) && entry.size == file.stat.size
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::fs::MemoryFileSystem;
    use crate::types::SymbolKind;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};

    fn indexer(fs: Arc<MemoryFileSystem>, config: IndexConfig) -> Indexer {
        Indexer::new(config, fs, Arc::new(HashEmbedder::new(64))).unwrap()
    }

    #[tokio::test]
    async fn test_index_symbols_and_imports() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/repo/a.ts", "export function foo() {}\n");
        fs.insert("/repo/b.ts", "import { foo } from './a';\nfoo();\n");

        let index = RepositoryIndex::new();
        let report = indexer(fs, IndexConfig::default())
            .index_repository(&index, Path::new("/repo"))
            .await
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert!(report.failed.is_empty());

        let foo = index.find_by_name("foo");
        assert_eq!(foo.len(), 1);
        assert_eq!(foo[0].kind, SymbolKind::Function);
        assert_eq!(foo[0].location.path, PathBuf::from("/repo/a.ts"));

        let b = index.file_id_for(Path::new("/repo/b.ts")).unwrap();
        assert_eq!(index.files_importing("foo"), vec![b]);
        assert_eq!(index.stats().embedding_count, 2);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/repo/ok.ts", "const ok = 1;");
        fs.insert_unreadable("/repo/locked.ts", 16);

        let index = RepositoryIndex::new();
        let report = indexer(fs, IndexConfig::default())
            .index_repository(&index, Path::new("/repo"))
            .await
            .unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PathBuf::from("/repo/locked.ts"));
        assert!(index.file_id_for(Path::new("/repo/locked.ts")).is_none());
    }

    #[tokio::test]
    async fn test_disabled_extraction_flags() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/repo/a.ts", "import { x } from './x';\nexport const y = x;\n");

        let index = RepositoryIndex::new();
        let config = IndexConfig {
            extract_symbols: false,
            extract_imports: false,
            generate_embeddings: false,
            ..Default::default()
        };
        indexer(fs, config)
            .index_repository(&index, Path::new("/repo"))
            .await
            .unwrap();

        let file = index.file_by_path(Path::new("/repo/a.ts")).unwrap();
        assert!(file.symbols.is_empty());
        assert!(file.imports.is_empty());
        assert_eq!(file.exports, vec!["y".to_string()]);
        assert!(file.embedding.is_none());
        assert_eq!(index.stats().embedding_count, 0);
    }

    #[tokio::test]
    async fn test_incremental_pass() {
        let fs = Arc::new(MemoryFileSystem::new());
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        fs.insert_with_mtime("/repo/a.ts", "export function foo() {}", t0);
        fs.insert_with_mtime("/repo/b.ts", "export function bar() {}", t0);

        let index = RepositoryIndex::new();
        let indexer = indexer(Arc::clone(&fs), IndexConfig::default());
        indexer.index_repository(&index, Path::new("/repo")).await.unwrap();
        let a_id = index.file_id_for(Path::new("/repo/a.ts")).unwrap();

        fs.insert_with_mtime("/repo/a.ts", "export function renamed() {}", t0 + Duration::from_secs(5));
        fs.remove(Path::new("/repo/b.ts"));

        let report = indexer.index_repository(&index, Path::new("/repo")).await.unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.removed, 1);

        assert_eq!(index.file_id_for(Path::new("/repo/a.ts")), Some(a_id));
        assert!(index.find_by_name("foo").is_empty());
        assert_eq!(index.find_by_name("renamed").len(), 1);
        assert!(index.find_by_name("bar").is_empty());

        let report = indexer.index_repository(&index, Path::new("/repo")).await.unwrap();
        assert_eq!(report.indexed, 0);
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let fs = Arc::new(MemoryFileSystem::new());
        for i in 0..5 {
            fs.insert(format!("/repo/{}.ts", i), "const a = 1;");
        }
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let index = RepositoryIndex::new();
        let config = IndexConfig {
            worker_count: 2,
            ..Default::default()
        };
        indexer(fs, config)
            .with_events(events)
            .index_repository(&index, Path::new("/repo"))
            .await
            .unwrap();

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::IndexProgress { processed, .. } = event {
                progress.push(processed);
            }
        }
        assert_eq!(progress, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn test_index_single_file() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/repo/a.rs", "pub struct Engine;\n");
        let index = RepositoryIndex::new();
        let indexer = indexer(Arc::clone(&fs), IndexConfig::default());

        let id = indexer.index_file(&index, Path::new("/repo/a.rs")).await.unwrap();
        assert_eq!(index.symbols_for_file(id)[0].name, "Engine");

        assert!(indexer.remove_file(&index, Path::new("/repo/a.rs")));
        assert!(!indexer.remove_file(&index, Path::new("/repo/a.rs")));
        assert!(indexer.index_file(&index, Path::new("/repo/missing.rs")).await.is_err());
    }
}

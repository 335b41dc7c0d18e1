//! In-memory repository index.
//!
//! [`RepositoryIndex`] owns every indexed file and symbol plus the lookup
//! tables built from them. All tables are concurrent maps so searches can run
//! while the indexer writes; writers additionally serialize on a single lock
//! so a file's symbols, name entries, import edges and embedding are always
//! replaced together.

use crate::parsing::ExtractedSymbol;
use crate::types::*;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::SystemTime;

/// Everything the indexer learned about one file, before ids are assigned.
#[derive(Debug, Clone)]
pub struct FileDraft {
    pub path: PathBuf,
    pub content: Arc<str>,
    pub language: Language,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub embedding: Option<Arc<[f32]>>,
    pub symbols: Vec<ExtractedSymbol>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

/// The complete in-memory index of one repository.
pub struct RepositoryIndex {
    // ========================================================================
    // Entries
    // ========================================================================
    files: DashMap<FileId, FileEntry>,
    symbols: DashMap<SymbolId, SymbolEntry>,

    // ========================================================================
    // Lookup tables
    // ========================================================================
    /// Symbol name -> every symbol declared with that name
    name_index: DashMap<String, Vec<SymbolId>>,
    /// Path -> file id (1:1)
    path_index: DashMap<PathBuf, FileId>,
    /// Imported identifier -> files importing it
    import_index: DashMap<String, Vec<FileId>>,
    embeddings: DashMap<FileId, Arc<[f32]>>,

    // ========================================================================
    // Metadata
    // ========================================================================
    root: RwLock<Option<PathBuf>>,
    last_indexed: RwLock<Option<SystemTime>>,
    total_size: AtomicU64,
    file_id_counter: AtomicU32,
    symbol_id_counter: AtomicU32,
    /// Serializes multi-table writes
    writer: Mutex<()>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            symbols: DashMap::new(),
            name_index: DashMap::new(),
            path_index: DashMap::new(),
            import_index: DashMap::new(),
            embeddings: DashMap::new(),
            root: RwLock::new(None),
            last_indexed: RwLock::new(None),
            total_size: AtomicU64::new(0),
            file_id_counter: AtomicU32::new(0),
            symbol_id_counter: AtomicU32::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Root of the repository, once an indexing pass has run.
    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().clone()
    }

    pub fn set_root(&self, root: PathBuf) {
        *self.root.write() = Some(root);
    }

    pub fn mark_indexed(&self) {
        *self.last_indexed.write() = Some(SystemTime::now());
    }

    /// Path relative to the root, or the path itself when outside it.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        match self.root.read().as_deref() {
            Some(root) => path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            None => path.to_path_buf(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace a file.
    ///
    /// A known path keeps its id and access statistics; its previous symbols,
    /// name entries, import edges and embedding are dropped first.
    pub fn upsert_file(&self, draft: FileDraft) -> FileId {
        let _guard = self.writer.lock();

        let existing = self.path_index.get(&draft.path).map(|r| *r);
        let (file_id, access_count, last_accessed) = match existing {
            Some(id) => {
                let previous = self.detach_file(id);
                let (count, last) = previous
                    .map(|f| (f.access_count, f.last_accessed))
                    .unwrap_or((0, None));
                (id, count, last)
            }
            None => {
                let id = FileId(self.file_id_counter.fetch_add(1, Ordering::SeqCst));
                self.path_index.insert(draft.path.clone(), id);
                (id, 0, None)
            }
        };

        let mut symbol_ids = Vec::with_capacity(draft.symbols.len());
        for extracted in draft.symbols {
            let id = SymbolId(self.symbol_id_counter.fetch_add(1, Ordering::SeqCst));
            let entry = SymbolEntry {
                id,
                name: extracted.name,
                kind: extracted.kind,
                location: Location {
                    file_id,
                    path: draft.path.clone(),
                    start_line: extracted.start_line,
                    start_col: extracted.start_col,
                    end_line: extracted.end_line,
                    end_col: extracted.end_col,
                },
                exported: extracted.exported,
                signature: extracted.signature,
            };
            self.name_index
                .entry(entry.name.clone())
                .or_default()
                .push(id);
            self.symbols.insert(id, entry);
            symbol_ids.push(id);
        }

        for import in &draft.imports {
            let mut files = self.import_index.entry(import.clone()).or_default();
            if !files.contains(&file_id) {
                files.push(file_id);
            }
        }

        if let Some(embedding) = &draft.embedding {
            self.embeddings.insert(file_id, Arc::clone(embedding));
        }

        self.total_size.fetch_add(draft.size, Ordering::SeqCst);
        self.files.insert(
            file_id,
            FileEntry {
                id: file_id,
                path: draft.path,
                content: draft.content,
                language: draft.language,
                size: draft.size,
                modified: draft.modified,
                embedding: draft.embedding,
                symbols: symbol_ids,
                imports: draft.imports,
                exports: draft.exports,
                indexed_at: SystemTime::now(),
                access_count,
                last_accessed,
            },
        );

        file_id
    }

    /// Remove a file and everything derived from it.
    pub fn remove_file(&self, path: &Path) -> Option<FileEntry> {
        let _guard = self.writer.lock();
        let (_, file_id) = self.path_index.remove(path)?;
        self.detach_file(file_id)
    }

    /// Drop a file's entry, symbols, name entries, import edges and
    /// embedding, keeping its path mapping. Caller holds the writer lock.
    fn detach_file(&self, file_id: FileId) -> Option<FileEntry> {
        let (_, entry) = self.files.remove(&file_id)?;

        for symbol_id in &entry.symbols {
            if let Some((_, symbol)) = self.symbols.remove(symbol_id) {
                remove_from_multimap(&self.name_index, &symbol.name, symbol_id);
            }
        }

        for import in &entry.imports {
            remove_from_multimap(&self.import_index, import, &file_id);
        }

        self.embeddings.remove(&file_id);
        self.total_size.fetch_sub(entry.size, Ordering::SeqCst);

        Some(entry)
    }

    /// Record that a file was returned to a caller.
    pub fn record_access(&self, file_id: FileId) {
        if let Some(mut entry) = self.files.get_mut(&file_id) {
            entry.access_count += 1;
            entry.last_accessed = Some(SystemTime::now());
        }
    }

    /// Reset the index to empty. Ids restart from zero.
    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.files.clear();
        self.symbols.clear();
        self.name_index.clear();
        self.path_index.clear();
        self.import_index.clear();
        self.embeddings.clear();
        self.total_size.store(0, Ordering::SeqCst);
        self.file_id_counter.store(0, Ordering::SeqCst);
        self.symbol_id_counter.store(0, Ordering::SeqCst);
        *self.last_indexed.write() = None;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_file(&self, id: FileId) -> Option<FileEntry> {
        self.files.get(&id).map(|r| r.clone())
    }

    pub fn file_by_path(&self, path: &Path) -> Option<FileEntry> {
        let id = self.file_id_for(path)?;
        self.get_file(id)
    }

    pub fn file_id_for(&self, path: &Path) -> Option<FileId> {
        self.path_index.get(path).map(|r| *r)
    }

    pub fn get_symbol(&self, id: SymbolId) -> Option<SymbolEntry> {
        self.symbols.get(&id).map(|r| r.clone())
    }

    /// All symbols declared with exactly this name, in declaration order.
    pub fn find_by_name(&self, name: &str) -> Vec<SymbolEntry> {
        self.name_index
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.get_symbol(*id)).collect())
            .unwrap_or_default()
    }

    pub fn symbols_for_file(&self, file_id: FileId) -> Vec<SymbolEntry> {
        self.files
            .get(&file_id)
            .map(|f| f.symbols.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.get_symbol(id))
            .collect()
    }

    /// Files whose imports include the given identifier.
    pub fn files_importing(&self, name: &str) -> Vec<FileId> {
        let mut ids = self
            .import_index
            .get(name)
            .map(|r| r.clone())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Files (other than the declaring one) that import a symbol's name.
    pub fn references(&self, symbol_id: SymbolId) -> Vec<FileId> {
        let Some(symbol) = self.get_symbol(symbol_id) else {
            return Vec::new();
        };
        self.files_importing(&symbol.name)
            .into_iter()
            .filter(|id| *id != symbol.location.file_id)
            .collect()
    }

    pub fn embedding(&self, file_id: FileId) -> Option<Arc<[f32]>> {
        self.embeddings.get(&file_id).map(|r| Arc::clone(&r))
    }

    /// Snapshot of every (file id, embedding) pair.
    pub fn embeddings(&self) -> Vec<(FileId, Arc<[f32]>)> {
        self.embeddings
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect()
    }

    /// Snapshot of every file, ordered by id.
    pub fn files(&self) -> Vec<FileEntry> {
        let mut files: Vec<_> = self.files.iter().map(|r| r.value().clone()).collect();
        files.sort_by_key(|f| f.id);
        files
    }

    /// Snapshot of every symbol, ordered by id.
    pub fn symbols(&self) -> Vec<SymbolEntry> {
        let mut symbols: Vec<_> = self.symbols.iter().map(|r| r.value().clone()).collect();
        symbols.sort_by_key(|s| s.id);
        symbols
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.path_index.iter().map(|r| r.key().clone()).collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            file_count: self.files.len(),
            symbol_count: self.symbols.len(),
            import_count: self.import_index.len(),
            embedding_count: self.embeddings.len(),
            total_size: self.total_size(),
            last_indexed: *self.last_indexed.read(),
        }
    }
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_from_multimap<K, V>(map: &DashMap<K, Vec<V>>, key: &K, value: &V)
where
    K: Eq + std::hash::Hash,
    V: PartialEq,
{
    let now_empty = match map.get_mut(key) {
        Some(mut values) => {
            values.retain(|v| v != value);
            values.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.remove_if(key, |_, values| values.is_empty());
    }
}

/// Statistics about the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub file_count: usize,
    pub symbol_count: usize,
    /// Distinct imported identifiers
    pub import_count: usize,
    pub embedding_count: usize,
    pub total_size: u64,
    pub last_indexed: Option<SystemTime>,
}

/// Thread-safe shared index handle.
pub type SharedIndex = Arc<RepositoryIndex>;

/// Create a new shared index.
pub fn create_index() -> SharedIndex {
    Arc::new(RepositoryIndex::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn symbol(name: &str, kind: SymbolKind, line: usize) -> ExtractedSymbol {
        ExtractedSymbol {
            name: name.to_string(),
            kind,
            start_line: line,
            start_col: 1,
            end_line: line,
            end_col: 1 + name.len(),
            exported: true,
            signature: format!("export function {}() {{}}", name),
        }
    }

    fn draft(path: &str, symbols: Vec<ExtractedSymbol>, imports: &[&str]) -> FileDraft {
        let content: Arc<str> = Arc::from("content");
        FileDraft {
            path: PathBuf::from(path),
            size: content.len() as u64,
            content,
            language: Language::TypeScript,
            modified: None,
            embedding: Some(Arc::from(vec![1.0, 0.0])),
            symbols,
            imports: imports.iter().map(|s| s.to_string()).collect(),
            exports: Vec::new(),
        }
    }

    #[test]
    fn test_upsert_populates_tables() {
        let index = RepositoryIndex::new();
        let a = index.upsert_file(draft("/r/a.ts", vec![symbol("foo", SymbolKind::Function, 1)], &[]));
        let b = index.upsert_file(draft("/r/b.ts", vec![], &["foo"]));

        let found = index.find_by_name("foo");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location.file_id, a);
        assert_eq!(index.files_importing("foo"), vec![b]);
        assert_eq!(index.references(found[0].id), vec![b]);
        assert_eq!(index.file_id_for(Path::new("/r/a.ts")), Some(a));
        assert!(index.embedding(a).is_some());
        assert_eq!(index.total_size(), 14);
    }

    #[test]
    fn test_reindex_keeps_id_and_replaces_symbols() {
        let index = RepositoryIndex::new();
        let id = index.upsert_file(draft("/r/a.ts", vec![symbol("old", SymbolKind::Function, 1)], &["x"]));
        index.record_access(id);

        let again = index.upsert_file(draft("/r/a.ts", vec![symbol("new", SymbolKind::Class, 2)], &[]));
        assert_eq!(id, again);
        assert!(index.find_by_name("old").is_empty());
        assert_eq!(index.find_by_name("new").len(), 1);
        assert!(index.files_importing("x").is_empty());
        assert_eq!(index.file_count(), 1);
        assert_eq!(index.symbol_count(), 1);
        assert_eq!(index.total_size(), 7);
        assert_eq!(index.get_file(id).unwrap().access_count, 1);
    }

    #[test]
    fn test_remove_cascades() {
        let index = RepositoryIndex::new();
        let id = index.upsert_file(draft(
            "/r/a.ts",
            vec![symbol("foo", SymbolKind::Function, 1), symbol("bar", SymbolKind::Const, 2)],
            &["baz"],
        ));

        let removed = index.remove_file(Path::new("/r/a.ts")).unwrap();
        assert_eq!(removed.id, id);
        assert!(index.find_by_name("foo").is_empty());
        assert!(index.find_by_name("bar").is_empty());
        assert!(index.files_importing("baz").is_empty());
        assert!(index.embedding(id).is_none());
        assert_eq!(index.symbol_count(), 0);
        assert_eq!(index.total_size(), 0);
        assert!(index.file_id_for(Path::new("/r/a.ts")).is_none());
        assert!(index.remove_file(Path::new("/r/a.ts")).is_none());
    }

    #[test]
    fn test_symbols_belong_to_live_files() {
        let index = RepositoryIndex::new();
        for i in 0..5 {
            index.upsert_file(draft(
                &format!("/r/{}.ts", i),
                vec![symbol("shared", SymbolKind::Function, 1)],
                &[],
            ));
        }
        index.remove_file(Path::new("/r/2.ts"));
        index.remove_file(Path::new("/r/4.ts"));

        for symbol in index.symbols() {
            assert!(index.get_file(symbol.location.file_id).is_some());
        }
        assert_eq!(index.find_by_name("shared").len(), 3);
    }

    #[test]
    fn test_record_access_and_stats() {
        let index = RepositoryIndex::new();
        let id = index.upsert_file(draft("/r/a.ts", vec![symbol("foo", SymbolKind::Function, 1)], &["react"]));
        index.record_access(id);
        index.record_access(id);

        let file = index.get_file(id).unwrap();
        assert_eq!(file.access_count, 2);
        assert!(file.last_accessed.is_some());

        let stats = index.stats();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.symbol_count, 1);
        assert_eq!(stats.import_count, 1);
        assert_eq!(stats.embedding_count, 1);

        index.clear();
        assert_eq!(index.stats().file_count, 0);
    }

    #[test]
    fn test_relative_path() {
        let index = RepositoryIndex::new();
        assert_eq!(index.relative_path(Path::new("/r/src/a.ts")), PathBuf::from("/r/src/a.ts"));
        index.set_root(PathBuf::from("/r"));
        assert_eq!(index.relative_path(Path::new("/r/src/a.ts")), PathBuf::from("src/a.ts"));
    }
}

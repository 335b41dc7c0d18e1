//! File-system provider consumed by the indexer.
//!
//! The engine never touches the disk directly; it goes through [`FileSystem`] so
//! hosts can supply their own view of the workspace (editor buffers, remote
//! mounts, tests).

use crate::error::{ContextError, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Read/stat/list access to a workspace.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// List every regular file under `root`.
    async fn list(&self, root: &Path) -> Result<Vec<PathBuf>>;

    async fn stat(&self, path: &Path) -> Result<FileStat>;

    async fn read_to_string(&self, path: &Path) -> Result<String>;
}

// ============================================================================
// Local disk
// ============================================================================

/// Disk-backed provider that respects `.gitignore` rules.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    include_hidden: bool,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include hidden files and directories in listings.
    pub fn include_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn list(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(ContextError::io(
                root,
                io::Error::new(io::ErrorKind::NotFound, "workspace root is not a directory"),
            ));
        }

        let root = root.to_path_buf();
        let include_hidden = self.include_hidden;
        let walk = move || {
            let walker = WalkBuilder::new(&root)
                .hidden(!include_hidden)
                .git_ignore(true)
                .git_global(true)
                .git_exclude(true)
                .require_git(false)
                .build();

            let mut files = Vec::new();
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if entry.file_type().is_some_and(|t| t.is_file()) {
                    files.push(entry.into_path());
                }
            }
            files.sort();
            files
        };

        tokio::task::spawn_blocking(walk)
            .await
            .map_err(|e| ContextError::Computation(format!("directory walk panicked: {}", e)))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ContextError::io(path, e))?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ContextError::io(path, e))
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryFile {
    content: String,
    modified: SystemTime,
    readable: bool,
}

/// In-memory provider for hosts that keep files in buffers, and for tests.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, MemoryFile>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.insert_with_mtime(path, content, SystemTime::now());
    }

    pub fn insert_with_mtime(
        &self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        modified: SystemTime,
    ) {
        self.files.write().insert(
            path.into(),
            MemoryFile {
                content: content.into(),
                modified,
                readable: true,
            },
        );
    }

    /// Add a file that lists and stats normally but fails on read.
    pub fn insert_unreadable(&self, path: impl Into<PathBuf>, size_hint: usize) {
        self.files.write().insert(
            path.into(),
            MemoryFile {
                content: " ".repeat(size_hint),
                modified: SystemTime::now(),
                readable: false,
            },
        );
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn list(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .read()
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let files = self.files.read();
        let file = files.get(path).ok_or_else(|| {
            ContextError::io(path, io::Error::new(io::ErrorKind::NotFound, "no such file"))
        })?;
        Ok(FileStat {
            size: file.content.len() as u64,
            modified: Some(file.modified),
        })
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.read();
        match files.get(path) {
            Some(file) if file.readable => Ok(file.content.clone()),
            Some(_) => Err(ContextError::io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            )),
            None => Err(ContextError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "no such file"),
            )),
        }
    }
}

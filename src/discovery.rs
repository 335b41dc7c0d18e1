//! File discovery module.
//!
//! Selects indexable files from a workspace listing using include/exclude globs
//! and a size cutoff.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::fs::{FileStat, FileSystem};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// A file selected for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub stat: FileStat,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovered {
    pub files: Vec<DiscoveredFile>,
    /// Listed files rejected by pattern, size or a failed stat
    pub skipped: usize,
}

/// Discovers indexable files in a repository.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    includes: GlobSet,
    has_includes: bool,
    user_excludes: GlobSet,
    default_excludes: GlobSet,
    max_file_size: u64,
}

impl FileDiscovery {
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let default_excludes = if config.default_excludes {
            build_globset(default_exclude_patterns())?
        } else {
            GlobSetBuilder::new().build()?
        };

        Ok(Self {
            includes: build_globset(config.include_patterns.iter().map(|s| s.as_str()))?,
            has_includes: !config.include_patterns.is_empty(),
            user_excludes: build_globset(config.exclude_patterns.iter().map(|s| s.as_str()))?,
            default_excludes,
            max_file_size: config.max_file_size,
        })
    }

    /// Check a root-relative path against the include/exclude patterns.
    ///
    /// An explicit include overrides the default excludes but never a user
    /// exclude.
    pub fn matches(&self, rel: &Path) -> bool {
        let included = self.includes.is_match(rel);
        if self.has_includes && !included {
            return false;
        }
        if self.user_excludes.is_match(rel) {
            return false;
        }
        !self.default_excludes.is_match(rel) || included
    }

    /// Discover all matching files under the given root.
    ///
    /// Files that cannot be stat'ed or exceed the size cutoff are skipped.
    pub async fn discover(&self, fs: &dyn FileSystem, root: &Path) -> Result<Discovered> {
        let listed = fs.list(root).await?;
        let mut files = Vec::with_capacity(listed.len());
        let mut skipped = 0;

        for path in listed {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if !self.matches(rel) {
                skipped += 1;
                continue;
            }

            let stat = match fs.stat(&path).await {
                Ok(stat) => stat,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };

            if stat.size > self.max_file_size {
                tracing::debug!(
                    "Skipping {} ({} bytes exceeds {} byte limit)",
                    path.display(),
                    stat.size,
                    self.max_file_size
                );
                skipped += 1;
                continue;
            }

            files.push(DiscoveredFile { path, stat });
        }

        Ok(Discovered { files, skipped })
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

fn default_exclude_patterns() -> Vec<&'static str> {
    vec![
        "**/.git/**",
        "**/target/**",
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/out/**",
        "**/coverage/**",
        "**/vendor/**",
        "**/.venv/**",
        "**/.next/**",
        "**/package-lock.json",
        "**/yarn.lock",
        "**/pnpm-lock.yaml",
        "**/Cargo.lock",
        "**/*.min.js",
        "**/*.min.css",
        "**/*.map",
        "**/*.png",
        "**/*.jpg",
        "**/*.jpeg",
        "**/*.gif",
        "**/*.webp",
        "**/*.ico",
        "**/*.pdf",
        "**/*.zip",
        "**/*.gz",
        "**/*.tar",
        "**/*.tgz",
        "**/*.jar",
        "**/*.wasm",
        "**/*.o",
        "**/*.a",
        "**/*.so",
        "**/*.dylib",
        "**/*.dll",
        "**/*.exe",
    ]
}

pub(crate) fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn discovery(config: IndexConfig) -> FileDiscovery {
        FileDiscovery::from_config(&config).unwrap()
    }

    #[test]
    fn test_default_excludes() {
        let d = discovery(IndexConfig::default());
        assert!(d.matches(Path::new("src/lib.ts")));
        assert!(!d.matches(Path::new("node_modules/pkg/index.js")));
        assert!(!d.matches(Path::new("target/debug/build.rs")));
        assert!(!d.matches(Path::new("package-lock.json")));
        assert!(!d.matches(Path::new("assets/logo.png")));
    }

    #[test]
    fn test_include_overrides_default_excludes() {
        let d = discovery(IndexConfig {
            include_patterns: vec!["target/**".to_string()],
            ..Default::default()
        });
        assert!(d.matches(Path::new("target/generated.rs")));
        // Includes act as an allow-list
        assert!(!d.matches(Path::new("src/lib.rs")));
    }

    #[test]
    fn test_user_exclude_beats_include() {
        let d = discovery(IndexConfig {
            include_patterns: vec!["src/**".to_string()],
            exclude_patterns: vec!["src/generated/**".to_string()],
            ..Default::default()
        });
        assert!(d.matches(Path::new("src/a.ts")));
        assert!(!d.matches(Path::new("src/generated/b.ts")));
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let result = FileDiscovery::from_config(&IndexConfig {
            exclude_patterns: vec!["src/[".to_string()],
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_discover_applies_size_cutoff() {
        let fs = MemoryFileSystem::new();
        fs.insert("/repo/small.ts", "const a = 1;");
        fs.insert("/repo/big.ts", "x".repeat(2048));
        fs.insert("/repo/node_modules/dep.js", "var d = 1;");

        let d = discovery(IndexConfig {
            max_file_size: 1024,
            ..Default::default()
        });
        let discovered = d.discover(&fs, Path::new("/repo")).await.unwrap();
        let paths: Vec<_> = discovered.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/repo/small.ts")]);
        assert_eq!(discovered.files[0].stat.size, 12);
        assert_eq!(discovered.skipped, 2);
    }
}

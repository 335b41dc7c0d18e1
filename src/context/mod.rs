//! Token-budgeted context window.
//!
//! The window holds files, symbols and free-form snippets up to
//! `max_tokens - reserved_tokens`. When an add would overflow the budget the
//! window compresses: entries are evicted in ascending priority, least recently
//! accessed first, until the new artifact fits.

use crate::config::WindowConfig;
use crate::error::{ContextError, Result};
use crate::types::{FileEntry, SymbolEntry};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Rough token estimate: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// What an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Symbol,
    Snippet,
}

/// One artifact in the window.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub id: String,
    pub kind: ArtifactKind,
    /// File the artifact came from, if any
    pub source: Option<PathBuf>,
    pub content: Arc<str>,
    pub tokens: usize,
    /// Higher survives longer
    pub priority: u32,
    pub added_at: Instant,
    pub last_access: Instant,
    pub access_count: u64,
    /// Monotonic access order, breaks ties between equal instants
    access_seq: u64,
}

/// Result of a successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub id: String,
    pub tokens: usize,
    /// Entries evicted to make room, in eviction order
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub entries: usize,
    pub total_tokens: usize,
    pub available_tokens: usize,
    pub remaining_tokens: usize,
    pub utilization: f32,
    /// Entries evicted over the window's lifetime
    pub evictions: u64,
}

/// Priority-ordered, token-budgeted artifact collection.
#[derive(Debug)]
pub struct ContextWindow {
    config: WindowConfig,
    entries: HashMap<String, WindowEntry>,
    total_tokens: usize,
    access_seq: u64,
    evictions: u64,
}

impl ContextWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            total_tokens: 0,
            access_seq: 0,
            evictions: 0,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn add_file(&mut self, file: &FileEntry, priority: u32) -> Result<AddOutcome> {
        self.add(
            file.id.to_string(),
            ArtifactKind::File,
            Some(file.path.clone()),
            Arc::clone(&file.content),
            priority,
        )
    }

    /// Adds the symbol's declaration line.
    pub fn add_symbol(&mut self, symbol: &SymbolEntry, priority: u32) -> Result<AddOutcome> {
        self.add(
            symbol.id.to_string(),
            ArtifactKind::Symbol,
            Some(symbol.location.path.clone()),
            Arc::from(symbol.signature.as_str()),
            priority,
        )
    }

    pub fn add_snippet(
        &mut self,
        id: impl Into<String>,
        content: impl Into<String>,
        priority: u32,
    ) -> Result<AddOutcome> {
        let content: String = content.into();
        self.add(id.into(), ArtifactKind::Snippet, None, Arc::from(content), priority)
    }

    /// Insert or replace an entry.
    ///
    /// Fails without touching the window when the artifact alone exceeds the
    /// budget, or when it does not fit and auto-compression is off.
    fn add(
        &mut self,
        id: String,
        kind: ArtifactKind,
        source: Option<PathBuf>,
        content: Arc<str>,
        priority: u32,
    ) -> Result<AddOutcome> {
        let tokens = estimate_tokens(&content);
        let available = self.available_tokens();
        if tokens > available {
            return Err(ContextError::BudgetExceeded {
                required: tokens,
                available,
            });
        }

        let replaced = self.entries.get(&id).map_or(0, |e| e.tokens);
        let base = self.total_tokens - replaced;
        if base + tokens > available && !self.config.auto_compress {
            return Err(ContextError::BudgetExceeded {
                required: tokens,
                available: available - base,
            });
        }

        self.remove(&id);

        let mut evicted = Vec::new();
        if self.total_tokens + tokens > available {
            evicted.extend(self.compress());
            while self.total_tokens + tokens > available {
                match self.evict_one() {
                    Some(evicted_id) => evicted.push(evicted_id),
                    None => break,
                }
            }
            tracing::debug!("Evicted {} entries to fit {} ({} tokens)", evicted.len(), id, tokens);
        }

        let now = Instant::now();
        let seq = self.next_seq();
        self.total_tokens += tokens;
        self.entries.insert(
            id.clone(),
            WindowEntry {
                id: id.clone(),
                kind,
                source,
                content,
                tokens,
                priority,
                added_at: now,
                last_access: now,
                access_count: 0,
                access_seq: seq,
            },
        );

        Ok(AddOutcome { id, tokens, evicted })
    }

    /// Evict lowest-priority entries until utilization is at or below the
    /// compression threshold. Returns the evicted ids.
    pub fn compress(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.utilization() > self.config.compression_threshold {
            match self.evict_one() {
                Some(id) => evicted.push(id),
                None => break,
            }
        }
        evicted
    }

    /// Lowest priority, then least recently accessed.
    fn evict_one(&mut self) -> Option<String> {
        let victim = self
            .entries
            .values()
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.access_seq.cmp(&b.access_seq))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|e| e.id.clone())?;
        self.remove(&victim);
        self.evictions += 1;
        Some(victim)
    }

    pub fn remove(&mut self, id: &str) -> Option<WindowEntry> {
        let entry = self.entries.remove(id)?;
        self.total_tokens -= entry.tokens;
        Some(entry)
    }

    /// Look up an entry, recording the access.
    pub fn get(&mut self, id: &str) -> Option<&WindowEntry> {
        let seq = self.next_seq();
        let entry = self.entries.get_mut(id)?;
        entry.last_access = Instant::now();
        entry.access_count += 1;
        entry.access_seq = seq;
        Some(entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Entries by priority descending, most recently accessed first among equals.
    pub fn entries(&self) -> Vec<&WindowEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.access_seq.cmp(&a.access_seq))
                .then_with(|| a.id.cmp(&b.id))
        });
        entries
    }

    /// Concatenate entry contents in priority order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            let label = entry
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| entry.id.clone());
            out.push_str(&format!("--- {} ({}) ---\n", label, entry.id));
            out.push_str(&entry.content);
            if !entry.content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn available_tokens(&self) -> usize {
        self.config.max_tokens.saturating_sub(self.config.reserved_tokens)
    }

    pub fn remaining_tokens(&self) -> usize {
        self.available_tokens().saturating_sub(self.total_tokens)
    }

    /// Fraction of the available budget in use.
    pub fn utilization(&self) -> f32 {
        let available = self.available_tokens();
        if available == 0 {
            return 0.0;
        }
        self.total_tokens as f32 / available as f32
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_tokens = 0;
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            entries: self.entries.len(),
            total_tokens: self.total_tokens,
            available_tokens: self.available_tokens(),
            remaining_tokens: self.remaining_tokens(),
            utilization: self.utilization(),
            evictions: self.evictions,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

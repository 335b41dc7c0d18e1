//! One engine instance: a shared index with its indexer, search, research and
//! orchestration layers, all publishing onto the same event bus.

use crate::config::EngineConfig;
use crate::context::ContextWindow;
use crate::embedding::{Embedder, HashEmbedder};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::indexer::{IndexReport, Indexer};
use crate::orchestrator::{ContextOrchestrator, ContextRequest, ContextResponse};
use crate::research::{CodeSource, DocumentationSource, MemoryNote, MemorySource, ResearchEngine};
use crate::search::SearchEngine;
use crate::state::{IndexStats, SharedIndex, create_index};
use crate::types::{SearchQuery, SearchResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct ContextEngine {
    config: EngineConfig,
    index: SharedIndex,
    events: EventBus,
    indexer: Indexer,
    search: Arc<SearchEngine>,
    research: Arc<ResearchEngine>,
    memory: Arc<MemorySource>,
    orchestrator: ContextOrchestrator,
}

impl ContextEngine {
    /// Build an engine. The code, documentation and memory research sources
    /// are registered automatically.
    pub fn new(config: EngineConfig, fs: Arc<dyn FileSystem>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;

        let events = EventBus::default();
        let index = create_index();
        let indexer = Indexer::new(config.index.clone(), fs, Arc::clone(&embedder))?.with_events(events.clone());
        let search = Arc::new(
            SearchEngine::new(Arc::clone(&index), embedder, &config.search).with_events(events.clone()),
        );

        let research = Arc::new(ResearchEngine::new(config.research.clone()).with_events(events.clone()));
        let memory = Arc::new(MemorySource::new());
        research.register_source(Arc::new(CodeSource::new(Arc::clone(&search))));
        research.register_source(Arc::new(DocumentationSource::new(Arc::clone(&search))));
        research.register_source(memory.clone());

        let orchestrator =
            ContextOrchestrator::new(config.orchestrator.clone(), Arc::clone(&search), Arc::clone(&research))
                .with_events(events.clone());

        Ok(Self {
            config,
            index,
            events,
            indexer,
            search,
            research,
            memory,
            orchestrator,
        })
    }

    /// Engine over the local disk with hashed embeddings.
    pub fn local(config: EngineConfig) -> Result<Self> {
        let embedder = HashEmbedder::new(config.index.embedding_dimension);
        Self::new(config, Arc::new(LocalFileSystem::new()), Arc::new(embedder))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn search_engine(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn research_engine(&self) -> &Arc<ResearchEngine> {
        &self.research
    }

    pub fn orchestrator(&self) -> &ContextOrchestrator {
        &self.orchestrator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn initialize(&self) -> Result<()> {
        self.orchestrator.initialize().await
    }

    /// Index (or re-index) a repository root. Cached search results and
    /// responses are dropped afterwards since they may be stale.
    pub async fn index_repository(&self, root: &Path) -> Result<IndexReport> {
        let report = self.indexer.index_repository(&self.index, root).await?;
        self.clear_caches();
        Ok(report)
    }

    /// Re-read one file into the index.
    pub async fn update_file(&self, path: &Path) -> Result<()> {
        self.indexer.update_file(&self.index, path).await?;
        self.clear_caches();
        Ok(())
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        let removed = self.indexer.remove_file(&self.index, path);
        if removed {
            self.clear_caches();
        }
        removed
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.search.search(query).await
    }

    pub async fn handle_request(&self, request: ContextRequest) -> Result<ContextResponse> {
        self.orchestrator.handle_request(request).await
    }

    /// Remember a note for the memory research source.
    pub fn remember(&self, note: MemoryNote) {
        self.memory.add_note(note);
    }

    /// Fresh window sized by the engine configuration.
    pub fn new_window(&self) -> ContextWindow {
        ContextWindow::new(self.config.window.clone())
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.index.root()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn clear_caches(&self) {
        self.search.clear_cache();
        self.research.clear_cache();
        self.orchestrator.clear_cache();
    }
}

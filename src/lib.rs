// Allow some clippy lints that are too strict for our codebase
#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

//! Omni Context
//!
//! A context retrieval and synthesis engine for AI coding agents.
//!
//! # Architecture
//!
//! 1. **Indexing**: [`Indexer`] walks a repository through a [`FileSystem`],
//!    extracts declarations, imports and exports, embeds each file and fills a
//!    shared [`RepositoryIndex`]. Re-runs skip unchanged files.
//!
//! 2. **Search**: [`SearchEngine`] answers semantic, keyword, symbol, regex and
//!    hybrid queries over the index, with filters and a TTL result cache.
//!
//! 3. **Context window**: [`ContextWindow`] keeps artifacts within a token
//!    budget, evicting low-priority, least recently used entries first.
//!
//! 4. **Research**: [`ResearchEngine`] gathers findings from several sources
//!    concurrently, ranks them and synthesizes a summary.
//!
//! 5. **Orchestration**: [`ContextOrchestrator`] fans a request out into
//!    search and research tasks, merges the results by importance and caches
//!    the response.
//!
//! # Usage
//!
//! ```ignore
//! use omni_context::{ContextEngine, ContextRequest, EngineConfig};
//!
//! let engine = ContextEngine::local(EngineConfig::default())?;
//! engine.index_repository("/path/to/repo".as_ref()).await?;
//!
//! let response = engine.handle_request(ContextRequest::new("token refresh")).await?;
//! for info in &response.info {
//!     println!("{:?} {}", info.importance, info.title);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod discovery;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod events;
pub mod fs;
pub mod indexer;
pub mod orchestrator;
pub mod parsing;
pub mod research;
pub mod search;
pub mod state;
pub mod text;
pub mod types;

// Re-exports
pub use cache::{CacheStats, TtlCache};
pub use config::{EngineConfig, IndexConfig, OrchestratorConfig, ResearchConfig, SearchConfig, WindowConfig};
pub use context::{AddOutcome, ContextWindow, WindowEntry, WindowStats, estimate_tokens};
pub use discovery::FileDiscovery;
pub use embedding::{Embedder, HashEmbedder};
pub use engine::ContextEngine;
pub use error::{ContextError, Result};
pub use events::{CacheKind, EngineEvent, EventBus, TaskKind};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use indexer::{IndexReport, Indexer};
pub use orchestrator::{
    ContextInfo, ContextNeed, ContextOrchestrator, ContextRequest, ContextResponse, Importance, InfoKind,
    InfoMetadata, OrchestratorState, OrchestratorStats, RequestConstraints,
};
pub use research::{
    Finding, MemoryNote, ResearchEngine, ResearchOverrides, ResearchSource, ResearchStatus, ResearchTask,
    SourceKind, Synthesis,
};
pub use search::SearchEngine;
pub use state::{IndexStats, RepositoryIndex, SharedIndex, create_index};
pub use types::*;

#[cfg(feature = "semantic")]
pub use embedding::FastEmbedder;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

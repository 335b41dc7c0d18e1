//! omni-context - CLI for the context engine
//!
//! # Usage
//!
//! ```bash
//! # Index a workspace
//! omni-context index --workspace /path/to/repo
//!
//! # Search for code
//! omni-context search --workspace /path/to/repo "parse configuration" --mode hybrid
//!
//! # Find a symbol
//! omni-context symbol --workspace /path/to/repo SearchEngine
//!
//! # Gather ranked context for a task
//! omni-context context "token refresh" --need code --need docs
//!
//! # Research a topic
//! omni-context research "cache eviction" --question "when are entries dropped?"
//! ```
//!
//! Results go to stdout, logs and errors to stderr. Exit codes: 0 = success,
//! 1 = error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omni_context::{
    ContextEngine, ContextInfo, ContextNeed, ContextRequest, EngineConfig, IndexReport, IndexStats,
    ResearchOverrides, ResearchTask, SearchMode, SearchQuery, SearchResult, SymbolEntry,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "omni-context")]
#[command(version)]
#[command(about = "Context retrieval and synthesis for AI coding agents")]
#[command(long_about = r#"
omni-context indexes a repository and assembles ranked context for a task.

It provides:
  - Semantic, keyword, symbol, regex and hybrid search
  - Concurrent research across code, documentation and notes
  - Importance-ranked context responses

Designed for automation: use --json for machine-readable output.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory to analyze
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the workspace and report what was found
    Index,

    /// Search the workspace
    Search {
        /// Search query (a regular expression in regex mode)
        query: String,

        /// Search mode: semantic, keyword, symbol, regex, hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        /// Maximum results to return
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Find symbol definitions by name
    Symbol {
        /// Symbol name to find
        name: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Assemble ranked context for a task
    Context {
        /// What the context is for
        query: String,

        /// Kind of context needed (repeatable): code, dependencies, patterns,
        /// error, solutions, docs, api
        #[arg(long = "need")]
        needs: Vec<ContextNeed>,

        /// Maximum records to return
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },

    /// Research a topic across code, documentation and notes
    Research {
        /// Topic to research
        topic: String,

        /// Specific question to answer (repeatable)
        #[arg(short, long = "question")]
        questions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only to stderr to keep stdout clean)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.clone();
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    match run_command(&cli, &workspace).await {
        Ok(output) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_human_readable(&output);
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": format!("{:#}", e)
                });
                eprintln!("{}", serde_json::to_string_pretty(&err)?);
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            EngineConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn run_command(cli: &Cli, workspace: &Path) -> Result<Output> {
    let config = load_config(cli.config.as_deref())?;
    let engine = ContextEngine::local(config).context("failed to build engine")?;
    let report = engine
        .index_repository(workspace)
        .await
        .with_context(|| format!("failed to index {}", workspace.display()))?;

    match &cli.command {
        Commands::Index => Ok(Output::Index {
            workspace: workspace.display().to_string(),
            report,
            stats: engine.stats(),
        }),

        Commands::Search { query, mode, limit } => {
            let results = engine
                .search(&SearchQuery::new(query.clone(), *mode).with_top_k(*limit))
                .await?;
            Ok(Output::Search {
                query: query.clone(),
                mode: *mode,
                results: results.into_iter().map(|r| SearchHit::from_result(&engine, r)).collect(),
            })
        }

        Commands::Symbol { name, limit } => {
            let mut symbols = engine.index().find_by_name(name);
            symbols.truncate(*limit);
            Ok(Output::Symbols {
                query: name.clone(),
                results: symbols,
            })
        }

        Commands::Context {
            query,
            needs,
            max_results,
        } => {
            let mut request = ContextRequest::new(query.clone()).with_needs(needs.iter().copied());
            if let Some(max_results) = max_results {
                request = request.with_max_results(*max_results);
            }
            let response = engine.handle_request(request).await?;
            Ok(Output::Context {
                query: query.clone(),
                success: response.success,
                errors: response.errors,
                info: response.info,
            })
        }

        Commands::Research { topic, questions } => {
            let task = engine
                .research_engine()
                .research(topic.clone(), questions.clone(), ResearchOverrides::default())
                .await?;
            Ok(Output::Research { task: Box::new(task) })
        }
    }
}

#[derive(serde::Serialize)]
#[serde(tag = "type")]
enum Output {
    Index {
        workspace: String,
        report: IndexReport,
        stats: IndexStats,
    },
    Search {
        query: String,
        mode: SearchMode,
        results: Vec<SearchHit>,
    },
    Symbols {
        query: String,
        results: Vec<SymbolEntry>,
    },
    Context {
        query: String,
        success: bool,
        errors: Vec<String>,
        info: Vec<ContextInfo>,
    },
    Research {
        task: Box<ResearchTask>,
    },
}

/// A search result flattened for display.
#[derive(serde::Serialize)]
struct SearchHit {
    id: String,
    score: f32,
    path: String,
    line: Option<usize>,
    symbol: Option<String>,
}

impl SearchHit {
    fn from_result(engine: &ContextEngine, result: SearchResult) -> Self {
        Self {
            path: result
                .file
                .as_ref()
                .map(|f| engine.index().relative_path(&f.path).display().to_string())
                .unwrap_or_default(),
            line: result
                .location
                .as_ref()
                .map(|l| l.start_line)
                .or_else(|| result.highlights.first().map(|h| h.line)),
            symbol: result.symbol.as_ref().map(|s| s.name.clone()),
            score: result.score,
            id: result.id,
        }
    }
}

fn print_human_readable(output: &Output) {
    match output {
        Output::Index {
            workspace,
            report,
            stats,
        } => {
            println!("Indexed {} files, {} symbols", stats.file_count, stats.symbol_count);
            println!(
                "  {} new or changed, {} unchanged, {} skipped, {} failed, {} removed",
                report.indexed,
                report.unchanged,
                report.skipped,
                report.failed.len(),
                report.removed
            );
            println!("Workspace: {}", workspace);
        }
        Output::Search { query, mode, results } => {
            println!("Search ({}): \"{}\"", mode.as_str(), query);
            println!("Found {} results:", results.len());
            for r in results {
                let location = match r.line {
                    Some(line) => format!("{}:{}", r.path, line),
                    None => r.path.clone(),
                };
                match &r.symbol {
                    Some(symbol) => println!("  {:.2} {} at {}", r.score, symbol, location),
                    None => println!("  {:.2} {}", r.score, location),
                }
            }
        }
        Output::Symbols { query, results } => {
            println!("Symbol: \"{}\"", query);
            println!("Found {} matches:", results.len());
            for s in results {
                println!(
                    "  {} ({}) at {}:{}",
                    s.name,
                    s.kind.as_str(),
                    s.location.path.display(),
                    s.location.start_line
                );
            }
        }
        Output::Context {
            query,
            success,
            errors,
            info,
        } => {
            println!("Context: \"{}\"", query);
            println!("Found {} records:", info.len());
            for i in info {
                println!("  [{}] {:.2} {} ({})", i.importance.as_str(), i.relevance, i.title, i.source);
            }
            if !success {
                println!("All tasks failed.");
            }
            for e in errors {
                eprintln!("  warning: {}", e);
            }
        }
        Output::Research { task } => {
            println!("Research: \"{}\" ({})", task.topic, task.status.as_str());
            if let Some(synthesis) = &task.synthesis {
                println!("{}", synthesis.summary);
                for point in &synthesis.key_points {
                    println!("  - {}", point);
                }
                if !synthesis.recommendations.is_empty() {
                    println!("Recommendations:");
                    for r in &synthesis.recommendations {
                        println!("  - {}", r);
                    }
                }
            }
            for (source, error) in &task.source_errors {
                eprintln!("  warning: {} source failed: {}", source.as_str(), error);
            }
        }
    }
}

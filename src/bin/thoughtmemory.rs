//! Thought memory CLI — ingest, search, and reflect over a local store.
//!
//! Usage:
//!   thoughtmemory ingest --session s1 --text "..." [--db path]
//!   thoughtmemory search --session s1 --query "..." [--limit 10] [--db path]
//!   thoughtmemory reflect --session s1 --query "..." [--mode reasoning] [--db path]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use thoughtmemory::{
    parse_and_store, Embedder, HashEmbedder, ParseAndStoreOptions, ReflectOptions,
    ReflectionEngine, ThoughtFilters, ThoughtGraph, ThoughtMemoryConfig, ThoughtStore,
};

#[derive(Parser)]
#[command(name = "thoughtmemory", version, about = "Persistent store for tagged reasoning fragments")]
struct Cli {
    /// Path to the SQLite database file; defaults to the platform data dir.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Increase log verbosity (can be repeated).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse `/thought[...]` fragments from text and store them.
    Ingest {
        #[arg(long)]
        session: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "reasoning")]
        category: String,
    },
    /// Hybrid semantic + recency search within a session.
    Search {
        #[arg(long)]
        session: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.7)]
        alpha: f64,
    },
    /// Run one reflection cycle and print the synthesized thoughts.
    Reflect {
        #[arg(long)]
        session: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "reasoning")]
        mode: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn open_store(db: Option<PathBuf>) -> thoughtmemory::ThoughtMemoryResult<ThoughtStore> {
    let config = ThoughtMemoryConfig::default();
    let path = db.unwrap_or(config.db_path);
    ThoughtStore::open(&path, config.embedding_dim, config.vector_backend)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> thoughtmemory::ThoughtMemoryResult<()> {
    let store = open_store(cli.db)?;
    let embedder = HashEmbedder::new(store.embedding_dim());

    match cli.command {
        Commands::Ingest { session, text, category } => {
            let result = parse_and_store(
                &text,
                &store,
                &embedder,
                ParseAndStoreOptions {
                    session_id: &session,
                    category: &category,
                    ..Default::default()
                },
            )?;
            println!("stored {} thought(s) (linear fallback: {})", result.thoughts.len(), result.used_linear_fallback);
            for t in &result.thoughts {
                println!("  [{}] {}", t.id, t.cleaned_text);
            }
        }
        Commands::Search { session, query, limit, alpha } => {
            let query_vec = embedder.embed(&query);
            let hits = store.semantic_search(&query_vec, &ThoughtFilters::session(&session), limit, alpha, 1000)?;
            for hit in hits {
                println!("{:.3}  [{}] {}", hit.score, hit.thought.id, hit.thought.cleaned_text);
            }
        }
        Commands::Reflect { session, query, mode, top_k } => {
            let store = Arc::new(store);
            let graph = Arc::new(ThoughtGraph::new(store.clone()));
            let embedder: Arc<dyn Embedder> = Arc::new(embedder);
            let engine = ReflectionEngine::new(store, Some(graph), embedder);

            let result = engine.reflect(ReflectOptions {
                query: &query,
                current_session_id: &session,
                mode: &mode,
                top_k,
                reflection_session_id: None,
                llm_callable: None,
            })?;

            println!("{}", result.reflection_text);
            println!("-- stored {} reflection(s) in {:.1}ms", result.stored_reflections.len(), result.latency_ms);
        }
    }
    Ok(())
}

//! # RAG Harness CLI (`rag`)
//!
//! The `rag` binary drives the ingestion and retrieval pipeline from
//! the command line: ingest an upload batch, query for ranked context,
//! inspect corpus state, and clear the durable artifacts.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the storage directory for the durable artifacts |
//! | `rag ingest <FILE>...` | Decode, chunk, embed, and index an upload batch |
//! | `rag query "<text>"` | Retrieve ranked context snippets for a question |
//! | `rag status` | Show entry counts, dimension, and artifact paths |
//! | `rag clear` | Delete the index and metadata artifacts together |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_harness::config::{self, Config};
use rag_harness::models::FileStatus;
use rag_harness::pipeline::{self, RagContext, UploadedFile};
use rag_harness::retrieve;

/// RAG Harness CLI — a document ingestion and retrieval pipeline for
/// chat assistants.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG Harness — a document ingestion and retrieval pipeline for chat assistants",
    version,
    long_about = "RAG Harness chunks uploaded documents, embeds them into vectors, and serves \
    ranked similarity search over the result. Small upload batches bypass indexing and keep \
    their raw text for direct prompt inclusion."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Built-in defaults apply when the file does not exist.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the storage directory for the durable artifacts.
    Init,

    /// Ingest a batch of uploaded files.
    ///
    /// Replaces any previously indexed corpus. Files that fail to
    /// decode are reported individually; the rest of the batch still
    /// ingests.
    Ingest {
        /// Files to ingest. `.csv` files are chunked row by row.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Retrieve ranked context snippets for a question.
    Query {
        /// The question text.
        query: String,

        /// Override the configured number of returned snippets.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show corpus status: entry counts, dimension, artifact paths.
    Status,

    /// Delete the index and metadata artifacts together. Idempotent.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Init => run_init(&cfg)?,
        Commands::Ingest { files } => run_ingest(&cfg, files).await?,
        Commands::Query { query, k } => run_query(&cfg, &query, k).await?,
        Commands::Status => run_status(&cfg)?,
        Commands::Clear => run_clear(&cfg)?,
    }

    Ok(())
}

fn run_init(cfg: &Config) -> Result<()> {
    for path in [&cfg.storage.index_path, &cfg.storage.metadata_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    println!("Storage initialized.");
    Ok(())
}

async fn run_ingest(cfg: &Config, paths: Vec<PathBuf>) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(UploadedFile { name, bytes });
    }

    let mut ctx = RagContext::new(cfg);
    let outcome = pipeline::ingest(&mut ctx, cfg, &files).await?;

    println!("ingest");
    println!("  files: {}", files.len());
    println!("  token estimate: {}", outcome.total_token_estimate);
    if outcome.rag_enabled {
        println!("  rag: enabled ({} chunks indexed)", outcome.chunks_indexed);
    } else {
        println!(
            "  rag: disabled (below threshold {}; raw content retained for the next prompt)",
            cfg.ingestion.rag_token_threshold
        );
    }
    for report in &outcome.reports {
        match &report.status {
            FileStatus::Indexed { chunks } => {
                println!("  {}: indexed {} chunks", report.filename, chunks)
            }
            FileStatus::RawRetained => println!("  {}: raw retained", report.filename),
            FileStatus::Failed { reason } => {
                println!("  {}: FAILED ({reason})", report.filename)
            }
        }
    }
    println!("ok");
    Ok(())
}

async fn run_query(cfg: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let mut ctx = RagContext::open(cfg)?;

    let mut retrieval_cfg = cfg.retrieval.clone();
    if let Some(k) = k {
        retrieval_cfg.top_k = k;
    }

    if !ctx.rag_enabled {
        println!("No indexed context. Fall back to raw document content or no context.");
        return Ok(());
    }

    let hits = retrieve::retrieve(&mut ctx, &retrieval_cfg, query).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.score, hit.source_filename);
        println!("    \"{}\"", snippet(&hit.text));
        println!();
    }
    Ok(())
}

fn run_status(cfg: &Config) -> Result<()> {
    let ctx = RagContext::open(cfg)?;
    let (index_entries, metadata_records) = ctx.counts();

    println!("status");
    println!(
        "  index: {} ({} entries)",
        cfg.storage.index_path.display(),
        index_entries
    );
    println!(
        "  metadata: {} ({} records)",
        cfg.storage.metadata_path.display(),
        metadata_records
    );
    match ctx.index.dimension() {
        Some(dim) => println!("  dimension: {dim}"),
        None => println!("  dimension: (no corpus)"),
    }
    println!(
        "  rag: {}",
        if ctx.rag_enabled { "enabled" } else { "disabled" }
    );
    println!("ok");
    Ok(())
}

fn run_clear(cfg: &Config) -> Result<()> {
    let mut ctx = RagContext::new(cfg);
    ctx.clear()?;
    println!("Cleared index and metadata artifacts.");
    Ok(())
}

/// Single-line excerpt for terminal display.
fn snippet(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    let mut out: String = flat.chars().take(160).collect();
    if flat.chars().count() > 160 {
        out.push('…');
    }
    out
}

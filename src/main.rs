use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragkit::cli;

#[derive(Parser)]
#[command(name = "ragkit")]
#[command(about = "Composable retrieval / RAG pipeline toolkit", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and chunk documents into a chunks.json corpus
    Ingest {
        /// Input file or directory
        #[arg(short, long)]
        input: String,

        /// Output chunks file
        #[arg(short, long)]
        output: String,

        /// Chunk size in characters
        #[arg(long, default_value = "512")]
        chunk_size: usize,

        /// Overlap between chunks in characters
        #[arg(long, default_value = "50")]
        chunk_overlap: usize,

        /// Chunking strategy: window or sentence
        #[arg(long, default_value = "window")]
        strategy: String,
    },

    /// Build and persist bm25/vector indexes for a chunk corpus
    Index {
        /// Chunks file from ingest
        #[arg(short, long)]
        chunks: String,

        /// Output index directory
        #[arg(short, long)]
        output: String,

        /// Which indexes to build: bm25, vector, or both
        #[arg(long, default_value = "both")]
        which: String,

        /// SQLite embedding cache path
        #[arg(long)]
        cache: Option<String>,
    },

    /// Build a retriever over a chunk corpus and search it
    Query {
        /// Chunks file from ingest
        #[arg(short, long)]
        chunks: String,

        /// Query text
        #[arg(short, long)]
        query: String,

        /// Retriever type: bm25, vector, keyword, summary,
        /// document-summary, tree, set-fusion, query-fusion,
        /// auto-merging, recursive, sentence-window
        #[arg(short, long, default_value = "vector")]
        retriever: String,

        /// Number of results (defaults to the configured per-type top-k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Retriever config file (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Load a persisted index directory instead of building in memory
        /// (bm25 and vector only)
        #[arg(long)]
        index: Option<String>,

        /// SQLite embedding cache path
        #[arg(long)]
        cache: Option<String>,
    },

    /// Retrieve, postprocess, and synthesize an answer
    Ask {
        /// Chunks file from ingest
        #[arg(short, long)]
        chunks: String,

        /// Question text
        #[arg(short, long)]
        query: String,

        /// Retriever type (same labels as `query`)
        #[arg(short, long, default_value = "vector")]
        retriever: String,

        /// Response mode: refine, compact, compact-accumulate,
        /// accumulate, tree-summarize, simple-summarize, no-text,
        /// generation
        #[arg(short, long, default_value = "compact")]
        mode: String,

        /// Number of results (defaults to the configured per-type top-k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Retriever config file (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Drop nodes scoring below this cutoff
        #[arg(long)]
        score_cutoff: Option<f32>,

        /// Reorder context so the best nodes sit at the edges
        #[arg(long)]
        reorder: bool,

        /// SQLite embedding cache path
        #[arg(long)]
        cache: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragkit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            input,
            output,
            chunk_size,
            chunk_overlap,
            strategy,
        } => {
            cli::ingest(input, output, chunk_size, chunk_overlap, strategy).await?;
        }

        Commands::Index {
            chunks,
            output,
            which,
            cache,
        } => {
            cli::index(chunks, output, which, cache).await?;
        }

        Commands::Query {
            chunks,
            query,
            retriever,
            top_k,
            config,
            index,
            cache,
        } => {
            cli::query(chunks, query, retriever, top_k, config, index, cache).await?;
        }

        Commands::Ask {
            chunks,
            query,
            retriever,
            mode,
            top_k,
            config,
            score_cutoff,
            reorder,
            cache,
        } => {
            cli::ask(
                chunks,
                query,
                retriever,
                mode,
                top_k,
                config,
                score_cutoff,
                reorder,
                cache,
            )
            .await?;
        }
    }

    Ok(())
}

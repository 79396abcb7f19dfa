//! docn CLI - Offline tooling for the retrieval core.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ulid::Ulid;

use docn_chunk::from_config;
use docn_core::{
    CancellationToken, ChunkingConfig, DocnConfig, DocumentChunker, IndexKind, RuntimeSettings,
    VectorEntry, VectorStore,
};
use docn_eval::{load_corpus, load_golden_dataset, CorpusRecord, RetrievalEvaluator};
use docn_lexical::Bm25Index;
use docn_query::{classify, QueryEngine, QueryRequest};
use docn_store::SqliteVectorStore;
use docn_vector::{MemoryVectorStore, VectorRetriever};

/// docn - Document retrieval, ranking and evaluation
#[derive(Parser)]
#[command(name = "docn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/docn/config.toml, then ./docn.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite vector database; vectors are kept in memory if not given
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a text file into chunks
    Chunk {
        /// File to chunk
        file: PathBuf,

        /// Maximum characters per chunk
        #[arg(long)]
        size: Option<usize>,

        /// Characters shared by consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,

        /// Attach title, section, type, keywords and importance
        #[arg(long, conflicts_with = "plain")]
        semantic: bool,

        /// Plain windows only, even if the config enables semantic chunking
        #[arg(long)]
        plain: bool,
    },

    /// Classify the intent of a query
    Classify {
        /// Query text
        query: String,
    },

    /// Search a corpus file
    Search {
        /// Corpus JSON file
        #[arg(long)]
        corpus: PathBuf,

        /// Search query
        query: String,

        /// Query embedding as a JSON array
        #[arg(long)]
        embedding: Option<String>,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// MMR lambda in (0, 1]
        #[arg(long)]
        lambda: Option<f32>,

        /// Minimum cosine similarity for vector hits
        #[arg(long)]
        min_similarity: Option<f32>,
    },

    /// Evaluate retrieval over a golden dataset
    Eval {
        /// Corpus JSON file
        #[arg(long)]
        corpus: PathBuf,

        /// Golden dataset JSON file
        #[arg(long)]
        golden: PathBuf,

        /// Metric cutoff
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// MMR lambda in (0, 1]
        #[arg(long)]
        lambda: Option<f32>,
    },

    /// Compare two MMR lambdas over a golden dataset
    Compare {
        /// Corpus JSON file
        #[arg(long)]
        corpus: PathBuf,

        /// Golden dataset JSON file
        #[arg(long)]
        golden: PathBuf,

        /// Lambda for configuration A
        #[arg(long)]
        lambda_a: f32,

        /// Lambda for configuration B
        #[arg(long)]
        lambda_b: f32,

        /// Metric cutoff
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&Path>) -> docn_core::Result<DocnConfig> {
    match path {
        Some(path) => DocnConfig::load(path),
        None => DocnConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chunk {
            file,
            size,
            overlap,
            semantic,
            plain,
        } => {
            let mut chunking = config.chunking.clone();
            chunking.chunk_size = size.unwrap_or(chunking.chunk_size);
            chunking.overlap = overlap.unwrap_or(chunking.overlap);
            if semantic {
                chunking.semantic = true;
            } else if plain {
                chunking.semantic = false;
            }
            chunk_file(&file, &chunking)?;
        }
        Commands::Classify { query } => {
            let intent = classify(&query);
            println!("{}", serde_json::to_string_pretty(&json!({ "query": query, "intent": intent }))?);
        }
        Commands::Search {
            corpus,
            query,
            embedding,
            top_k,
            lambda,
            min_similarity,
        } => {
            let records = load_corpus(&corpus)?;
            let store = open_store(cli.database.as_deref(), &records).await?;
            let engine = build_engine(&config, store, &records, None)?;

            let mut request = QueryRequest::new(query);
            request.embedding = embedding.as_deref().map(parse_embedding).transpose()?;
            request.top_k = top_k;
            request.lambda = lambda;
            request.min_similarity = min_similarity;

            let response = engine.search(&request, &CancellationToken::new()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Eval {
            corpus,
            golden,
            k,
            lambda,
        } => {
            let records = load_corpus(&corpus)?;
            let queries = load_golden_dataset(&golden)?;
            let store = open_store(cli.database.as_deref(), &records).await?;
            let engine = build_engine(&config, store, &records, lambda)?;

            let evaluator = RetrievalEvaluator::new(k.unwrap_or(config.evaluation.k))?;
            let result = evaluator
                .evaluate(&engine, &queries, &CancellationToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Compare {
            corpus,
            golden,
            lambda_a,
            lambda_b,
            k,
        } => {
            let records = load_corpus(&corpus)?;
            let queries = load_golden_dataset(&golden)?;
            let store = open_store(cli.database.as_deref(), &records).await?;
            let a = build_engine(&config, Arc::clone(&store), &records, Some(lambda_a))?;
            let b = build_engine(&config, store, &records, Some(lambda_b))?;

            let evaluator = RetrievalEvaluator::new(k.unwrap_or(config.evaluation.k))?;
            let comparison = evaluator
                .compare(&a, &b, &queries, &CancellationToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
    }

    Ok(())
}

fn chunk_file(file: &Path, chunking: &ChunkingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;

    let chunker = from_config(chunking)?;
    let chunks = chunker.chunk_document(Ulid::new(), &text)?;
    info!("Split {:?} into {} chunks", file, chunks.len());

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

fn parse_embedding(raw: &str) -> docn_core::Result<Vec<f32>> {
    Ok(serde_json::from_str(raw)?)
}

/// Open the vector store and load every corpus embedding into it.
async fn open_store(
    database: Option<&Path>,
    records: &[CorpusRecord],
) -> docn_core::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match database {
        Some(path) => Arc::new(SqliteVectorStore::open(path)?),
        None => Arc::new(MemoryVectorStore::new()),
    };

    let entries: Vec<VectorEntry> = records.iter().filter_map(|r| r.vector_entry()).collect();
    if !entries.is_empty() {
        store.batch_store_vectors(&entries).await?;
        store.create_or_update_index("chunks", IndexKind::Flat).await?;
    }

    info!("Loaded {} of {} chunks into the vector store", entries.len(), records.len());
    Ok(store)
}

fn build_engine(
    config: &DocnConfig,
    store: Arc<dyn VectorStore>,
    records: &[CorpusRecord],
    lambda: Option<f32>,
) -> docn_core::Result<QueryEngine<dyn VectorStore>> {
    let lexical = Arc::new(Bm25Index::new());
    let corpus: HashMap<Ulid, String> = records.iter().map(|r| (r.id, r.text.clone())).collect();
    lexical.update_statistics(&corpus);

    let settings = RuntimeSettings::new(lambda.or(config.retrieval.mmr_lambda))?;
    let retriever = VectorRetriever::new(store, Arc::new(settings), config.retrieval.clone());

    Ok(QueryEngine::new(lexical, Arc::new(retriever)))
}

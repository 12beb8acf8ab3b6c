//! DP Vote command-line driver.
//!
//! Builds a passage index, runs private generation against it, and
//! summarizes the run log.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! Logs go to stderr; the answer and the ε spent go to stdout.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features cli --bin dp_vote_run -- index --data ./docs --out index.json
//! cargo run --features cli --bin dp_vote_run -- generate --config run.json --index index.json \
//!     --query "What was reported?" --log runs.jsonl
//! cargo run --features cli --bin dp_vote_run -- summarize --log runs.jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use dp_vote_kernel::retrieval::{
    chunk_dir, CacheConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use dp_vote_kernel::runlog::{append_record, read_records, summarize};
use dp_vote_kernel::{
    CachingRetriever, DpSparseVoteEngine, DpVoteEngine, InMemoryPassageStore, JudgingVoter,
    MockModel, PrivateGenerator, RetrievalVoter, RunConfig, RunRecord, Scheme, TokenSampler, Voter,
};

#[derive(Debug, Parser)]
#[command(name = "dp_vote_run", version, about = "Differentially private answer generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chunk .txt/.md files into a passage index.
    Index {
        /// Directory to scan recursively.
        #[arg(long)]
        data: PathBuf,
        /// Output index path.
        #[arg(long)]
        out: PathBuf,
        /// Chunk length in characters.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Overlap between chunks in characters.
        #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
        overlap: usize,
    },
    /// Answer a question under the configured privacy budget.
    Generate {
        /// Run configuration (JSON).
        #[arg(long)]
        config: PathBuf,
        /// Question to answer.
        #[arg(long)]
        query: String,
        /// Passage index; an empty index (with a warning) when omitted or missing.
        #[arg(long)]
        index: Option<PathBuf>,
        /// Run log to append to.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Override `generation.max_tokens`.
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Summarize ε spent across a run log.
    Summarize {
        /// Run log to read.
        #[arg(long)]
        log: PathBuf,
    },
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dp_vote_run=info,dp_vote_kernel=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    }
}

fn run_index(
    data: PathBuf,
    out: PathBuf,
    chunk_size: usize,
    overlap: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let passages = chunk_dir(&data, chunk_size, overlap)?;
    let store = InMemoryPassageStore::from_passages(passages);
    store.save(&out)?;

    info!(
        data = %data.display(),
        out = %out.display(),
        passages = store.len(),
        "index written"
    );
    println!("indexed {} passages -> {}", store.len(), out.display());
    Ok(())
}

async fn run_generate(
    config_path: PathBuf,
    query: String,
    index: Option<PathBuf>,
    log: Option<PathBuf>,
    max_tokens: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = RunConfig::from_path(&config_path)?;
    let privacy = &config.privacy;
    let max_tokens = max_tokens.unwrap_or(config.generation.max_tokens);

    let store = InMemoryPassageStore::open_index(index.as_deref())?;
    info!(
        scheme = %privacy.scheme,
        m_voters = privacy.m_voters,
        passages = store.len(),
        config_hash = %privacy.params_hash(),
        "run configured"
    );

    let retriever = Arc::new(CachingRetriever::with_config(
        Arc::new(store),
        CacheConfig::with_capacity(config.retrieval.cache_entries),
    ));
    // One seed drives the model and the engine noise.
    let seed = config.generation.seed.unwrap_or_else(rand::random);
    let model = Arc::new(MockModel::with_seed(seed));
    let voters: Vec<Arc<RetrievalVoter<_, MockModel>>> = (0..privacy.m_voters)
        .map(|_| {
            Arc::new(RetrievalVoter::with_top_k(
                retriever.clone(),
                model.clone(),
                config.retrieval.top_k,
            ))
        })
        .collect();

    let vote = privacy.vote_config();
    let mut engine: Box<dyn PrivateGenerator> = match privacy.scheme {
        Scheme::DpVote => {
            let voters = voters.into_iter().map(|v| v as Arc<dyn Voter>).collect();
            Box::new(DpVoteEngine::with_seed(voters, vote, seed)?)
        }
        Scheme::DpSparseVote => {
            let baseline: Arc<dyn TokenSampler> =
                Arc::new(MockModel::with_seed(seed.wrapping_add(1)));
            let voters = voters.into_iter().map(|v| v as Arc<dyn JudgingVoter>).collect();
            let svt = privacy.svt_config()?;
            Box::new(DpSparseVoteEngine::with_seed(voters, baseline, vote, svt, seed)?)
        }
    };

    let start = Instant::now();
    let span = info_span!("generate", scheme = %engine.scheme(), max_tokens, seed);
    let outcome = engine.generate(&query, max_tokens).instrument(span).await;

    let stats = retriever.stats();
    info!(
        latency_ms = start.elapsed().as_millis() as u64,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "run completed"
    );

    if let Some(log) = &log {
        append_record(log, &RunRecord::new(&query, privacy, &outcome))?;
    }

    println!("eps_spent: {:.4} / {:.4}", outcome.eps_spent, privacy.max_total_epsilon);
    println!("stop_reason: {}", outcome.stop_reason);
    println!("{}", outcome.text);
    Ok(())
}

fn run_summarize(log: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let records = read_records(&log)?;
    match summarize(&records) {
        Some(summary) => {
            println!("runs: {}", summary.runs);
            println!("mean_eps: {:.4}", summary.mean_eps);
            println!("max_eps: {:.4}", summary.max_eps);
        }
        None => println!("no runs in {}", log.display()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "dp_vote_run starting");

    match cli.command {
        Command::Index {
            data,
            out,
            chunk_size,
            overlap,
        } => run_index(data, out, chunk_size, overlap),
        Command::Generate {
            config,
            query,
            index,
            log,
            max_tokens,
        } => run_generate(config, query, index, log, max_tokens).await,
        Command::Summarize { log } => run_summarize(log),
    }
}

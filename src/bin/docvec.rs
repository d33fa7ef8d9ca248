use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use docvec_core::producer::{build_local_index, ingest_document};
use docvec_core::{
    ApiEmbedConfig, ApiEmbedder, AppendRequest, BatchEmbedder, CombinedStore, EmbedderConfig,
    LocalIndexPaths, LockSettings, MergeOptions, ParsedDocument, StoreLock, append_batch,
    extend_store, extract_form_segments, merge_directory,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "docvec",
    version,
    about = "Build per-document vector indices, merge them, and append to the combined store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed one parsed document into a local index
    Ingest(IngestArgs),
    /// Merge every local index in a directory into a fresh combined store
    Merge(MergeArgs),
    /// Merge additional local indices into an existing combined store
    Extend(ExtendArgs),
    /// Append text to the combined store as new records
    Append(AppendArgs),
    /// Roll back any interrupted commit, then check the store's invariants and print its sizes
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct EmbedArgs {
    /// API key for the embedding service
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL of the OpenAI-compatible embeddings API
    #[arg(
        long,
        env = "DOCVEC_EMBED_BASE_URL",
        default_value = "https://api.upstage.ai/v1"
    )]
    base_url: String,

    /// Model used for batch passage embeddings
    #[arg(long, env = "DOCVEC_PASSAGE_MODEL", default_value = "embedding-passage")]
    passage_model: String,

    /// Model used for single-item fallback embeddings
    #[arg(long, env = "DOCVEC_QUERY_MODEL", default_value = "embedding-query")]
    query_model: String,

    /// Expected vector dimension
    #[arg(long, env = "DOCVEC_EMBED_DIMENSION", default_value_t = docvec_core::EMBEDDING_DIMENSION)]
    dimension: usize,

    /// Segments per embedding request before any reduction
    #[arg(long, env = "DOCVEC_EMBED_BATCH", default_value_t = docvec_core::DEFAULT_EMBED_BATCH_SIZE)]
    batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "DOCVEC_EMBED_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Attempts per request for rate limits or transient errors
    #[arg(long, env = "DOCVEC_EMBED_MAX_RETRIES", default_value_t = 3)]
    max_retries: usize,
}

impl EmbedArgs {
    fn embedder(&self) -> Result<BatchEmbedder<ApiEmbedder>> {
        let config = ApiEmbedConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            passage_model: self.passage_model.clone(),
            query_model: self.query_model.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            max_retries: self.max_retries.max(1),
        };
        let provider = ApiEmbedder::new(config)?;
        let batching = EmbedderConfig::default()
            .with_batch_size(self.batch_size)
            .with_dimension(self.dimension);
        Ok(BatchEmbedder::new(provider, batching))
    }
}

#[derive(Args, Debug)]
struct LockArgs {
    /// Milliseconds to wait for the combined store's writer lock
    #[arg(long, env = "DOCVEC_LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    lock_timeout_ms: u64,
}

impl LockArgs {
    fn settings(&self) -> LockSettings {
        LockSettings {
            timeout_ms: self.lock_timeout_ms,
            ..LockSettings::default()
        }
    }
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Document-parse JSON output for one source document
    #[arg(long)]
    input: PathBuf,

    /// Directory receiving the local index files
    #[arg(long, env = "DOCVEC_EMBEDDED_DIR", default_value = "embedded")]
    out_dir: PathBuf,

    /// Local index name (defaults to the input file stem)
    #[arg(long)]
    name: Option<String>,

    /// Source file label recorded on every segment (defaults to `<stem>.pdf`)
    #[arg(long)]
    source_file: Option<String>,

    /// Treat the document as a form from this folder; segments get a keyword
    #[arg(long)]
    form_folder: Option<String>,

    #[command(flatten)]
    embed: EmbedArgs,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Directory holding local index files
    #[arg(long, env = "DOCVEC_EMBEDDED_DIR", default_value = "embedded")]
    embedded_dir: PathBuf,

    /// Directory of the combined store
    #[arg(long, env = "DOCVEC_COMBINED_DIR", default_value = "combined")]
    combined_dir: PathBuf,

    /// Skip writing merge_summary.json
    #[arg(long, default_value_t = false)]
    no_summary: bool,

    #[command(flatten)]
    lock: LockArgs,
}

#[derive(Args, Debug)]
struct ExtendArgs {
    /// Directory of the combined store
    #[arg(long, env = "DOCVEC_COMBINED_DIR", default_value = "combined")]
    combined_dir: PathBuf,

    /// Local index files (`local_index_<name>.vecindex`) to merge in
    #[arg(required = true)]
    indices: Vec<PathBuf>,

    /// Skip writing merge_summary.json
    #[arg(long, default_value_t = false)]
    no_summary: bool,

    #[command(flatten)]
    lock: LockArgs,
}

#[derive(Args, Debug)]
struct AppendArgs {
    /// Directory of the combined store
    #[arg(long, env = "DOCVEC_COMBINED_DIR", default_value = "combined")]
    combined_dir: PathBuf,

    /// Text to append; repeat for several records
    #[arg(long = "text", required = true)]
    texts: Vec<String>,

    /// Source identifier (defaults to the current local time, `%Y%m%d_%H%M%S`)
    #[arg(long)]
    timestamp: Option<String>,

    #[command(flatten)]
    lock: LockArgs,

    #[command(flatten)]
    embed: EmbedArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Directory of the combined store
    #[arg(long, env = "DOCVEC_COMBINED_DIR", default_value = "combined")]
    combined_dir: PathBuf,

    #[command(flatten)]
    lock: LockArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Ingest(args) => ingest(&args),
        Command::Merge(args) => {
            let options = MergeOptions {
                lock: args.lock.settings(),
                write_summary: !args.no_summary,
            };
            let report = merge_directory(&args.embedded_dir, &args.combined_dir, &options)?;
            print_json(&report)
        }
        Command::Extend(args) => {
            let sources = args
                .indices
                .iter()
                .map(|path| {
                    LocalIndexPaths::from_index_file(path)
                        .ok_or_else(|| anyhow!("{} is not a local index file", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let options = MergeOptions {
                lock: args.lock.settings(),
                write_summary: !args.no_summary,
            };
            let report = extend_store(&args.combined_dir, &sources, &options)?;
            print_json(&report)
        }
        Command::Append(args) => {
            let embedder = args.embed.embedder()?;
            let requests: Vec<AppendRequest> = args
                .texts
                .iter()
                .map(|text| {
                    let request = AppendRequest::new(text.clone());
                    match &args.timestamp {
                        Some(ts) => request.with_timestamp(ts.clone()),
                        None => request,
                    }
                })
                .collect();
            let report = append_batch(
                &args.combined_dir,
                &requests,
                &embedder,
                &args.lock.settings(),
            )?;
            print_json(&report)
        }
        Command::Verify(args) => {
            let _lock = StoreLock::acquire(&args.combined_dir, &args.lock.settings())?;
            CombinedStore::recover(&args.combined_dir)?;
            let store = CombinedStore::open_if_exists(&args.combined_dir)?.ok_or_else(|| {
                anyhow!("no combined store in {}", args.combined_dir.display())
            })?;
            print_json(&store.verify()?)
        }
    }
}

fn ingest(args: &IngestArgs) -> Result<()> {
    let bytes = fs_err::read(&args.input)?;
    let document: ParsedDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let stem = file_stem(&args.input)?;
    let name = args.name.clone().unwrap_or_else(|| stem.clone());
    let source_file = args
        .source_file
        .clone()
        .unwrap_or_else(|| format!("{stem}.pdf"));
    let embedder = args.embed.embedder()?;

    let (paths, report) = match &args.form_folder {
        None => ingest_document(&document, &name, &source_file, &args.out_dir, &embedder)?,
        Some(folder) => {
            let segments = extract_form_segments(&document, &source_file, folder)?;
            let (local, report) = build_local_index(&name, &segments, &embedder)?;
            (local.write(&args.out_dir, &segments)?, report)
        }
    };

    print_json(&IngestSummary {
        name,
        index: paths.index_path,
        vectors: report.len(),
        zero_filled: report.zero_filled,
        failed_batches: report.failed_batches,
    })
}

#[derive(Serialize)]
struct IngestSummary {
    name: String,
    index: PathBuf,
    vectors: usize,
    zero_filled: Vec<usize>,
    failed_batches: Vec<usize>,
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("cannot derive a name from {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use encode::{clean_output_path, write_entries, write_file_atomic, write_match_output, OutputFormat};
use phone_matcher_normalizer::normalize;
use phone_matcher_pipeline::{IngestionPipeline, MatchPipeline, RowStream};
use phone_matcher_protocol::OwnerId;
use phone_matcher_registry::{export_all, PoolConfig, Registry, SqliteRegistry};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

mod config;
mod decode;
mod encode;

#[derive(Parser)]
#[command(name = "phone-matcher")]
#[command(about = "Phone registry ingestion and unmatched-number extraction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// TOML settings file (database, [pipeline], [pool])
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry database path (overrides PHONE_MATCHER_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum pooled storage connections (overrides PHONE_MATCHER_POOL_SIZE)
    #[arg(long, global = true)]
    pool_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the phones of an admin upload to the registry
    Ingest(IngestArgs),

    /// Write the phones of a client upload that are not in the registry
    Match(MatchArgs),

    /// Print the number of registered phones
    Count(CountArgs),

    /// Find registry rows by phone or owner substring
    Search(SearchArgs),

    /// Remove one phone from the registry
    Delete(DeleteArgs),

    /// Dump the whole registry, oldest first
    Export(ExportArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// CSV file; the phone column is the first header naming a phone, else the first column
    file: PathBuf,

    /// Owner recorded for newly added phones
    #[arg(long)]
    owner: String,

    /// Phones buffered before each flush (overrides PHONE_MATCHER_INGEST_CHUNK)
    #[arg(long)]
    flush_every: Option<usize>,

    /// Rows per storage call within a flush (overrides PHONE_MATCHER_UPSERT_CHUNK)
    #[arg(long)]
    upsert_chunk: Option<usize>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MatchArgs {
    /// CSV file with a phone column and an optional state/region column
    file: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Output path (defaults to `<stem>-clean.<format>` next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Distinct phones per anti-join (overrides PHONE_MATCHER_MATCH_CHUNK)
    #[arg(long)]
    flush_every: Option<usize>,

    /// Print a JSON summary instead of the output path
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CountArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Substring of a phone or owner (empty matches everything)
    #[arg(default_value = "")]
    pattern: String,

    /// Page number, 1-based
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Rows per page
    #[arg(long, default_value_t = 20)]
    page_size: usize,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DeleteArgs {
    /// Phone to remove, in any format that normalizes
    phone: String,
}

#[derive(Args)]
struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Output path (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct MatchSummary {
    rows_read: usize,
    accepted: usize,
    rejected: usize,
    unmatched: usize,
    flushes: usize,
    elapsed_ms: u64,
    tagged: bool,
    output_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for machine-readable output
    let json_output = match &cli.command {
        Commands::Ingest(args) => args.json,
        Commands::Match(args) => args.json,
        Commands::Count(args) => args.json,
        Commands::Search(args) => args.json,
        Commands::Export(args) => args.output.is_none(),
        Commands::Delete(_) => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db.take() {
        config.database = db;
    }
    if let Some(size) = cli.pool_size {
        config.pool = PoolConfig::new(size);
    }

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, config).await?,
        Commands::Match(args) => run_match(args, config).await?,
        Commands::Count(args) => run_count(args, config).await?,
        Commands::Search(args) => run_search(args, config).await?,
        Commands::Delete(args) => run_delete(args, config).await?,
        Commands::Export(args) => run_export(args, config).await?,
    }

    Ok(())
}

async fn open_registry(config: &AppConfig) -> Result<Arc<SqliteRegistry>> {
    let registry = SqliteRegistry::open(&config.database, config.pool)
        .await
        .with_context(|| format!("Failed to open registry {}", config.database.display()))?;
    Ok(Arc::new(registry))
}

/// Wait for the decoder once the pipeline has stopped pulling rows.
async fn finish_decoder<S: RowStream>(stream: S, decoder: JoinHandle<()>) -> Result<()> {
    drop(stream);
    decoder.await.context("CSV decoder task failed")
}

fn check_input(path: &Path) -> Result<()> {
    decode::check_supported(path)?;
    if !path.is_file() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    Ok(())
}

/// Add an admin upload to the registry
async fn run_ingest(args: IngestArgs, mut config: AppConfig) -> Result<()> {
    let owner = OwnerId::new(args.owner).context("--owner must not be blank")?;
    check_input(&args.file)?;
    if let Some(n) = args.flush_every {
        config.pipeline.ingest_flush_threshold = n;
    }
    if let Some(n) = args.upsert_chunk {
        config.pipeline.upsert_chunk_size = n;
    }

    let registry = open_registry(&config).await?;
    let pipeline = IngestionPipeline::new(Arc::clone(&registry), config.pipeline);
    let (mut stream, decoder) = decode::spawn_csv_decoder(&args.file);
    let report = pipeline
        .run(&mut stream, &owner)
        .await
        .with_context(|| format!("Failed to ingest {}", args.file.display()))?;
    finish_decoder(stream, decoder).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "Ingested {} rows: {} accepted, {} rejected, {} new in {}ms",
            report.rows_read, report.accepted, report.rejected, report.affected, report.elapsed_ms
        );
    }
    Ok(())
}

/// Extract the phones of a client upload that are not registered
async fn run_match(args: MatchArgs, mut config: AppConfig) -> Result<()> {
    check_input(&args.file)?;
    if let Some(n) = args.flush_every {
        config.pipeline.match_flush_threshold = n;
    }
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| clean_output_path(&args.file, args.format));

    let registry = open_registry(&config).await?;
    let pipeline = MatchPipeline::new(Arc::clone(&registry), config.pipeline);
    let (mut stream, decoder) = decode::spawn_csv_decoder(&args.file);
    let report = pipeline
        .run(&mut stream)
        .await
        .with_context(|| format!("Failed to match {}", args.file.display()))?;
    finish_decoder(stream, decoder).await?;

    write_file_atomic(&output_path, |out| {
        write_match_output(out, &report.output, args.format)
    })?;

    if args.json {
        let summary = MatchSummary {
            rows_read: report.rows_read,
            accepted: report.accepted,
            rejected: report.rejected,
            unmatched: report.unmatched(),
            flushes: report.flushes,
            elapsed_ms: report.elapsed_ms,
            tagged: report.output.is_tagged(),
            output_path,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!(
            "Matched {} rows: {} unmatched in {}ms",
            report.rows_read,
            report.unmatched(),
            report.elapsed_ms
        );
        println!("{}", output_path.display());
    }
    Ok(())
}

async fn run_count(args: CountArgs, config: AppConfig) -> Result<()> {
    let registry = open_registry(&config).await?;
    let count = registry.count().await?;
    if args.json {
        println!("{}", serde_json::json!({ "count": count }));
    } else {
        println!("{count}");
    }
    Ok(())
}

async fn run_search(args: SearchArgs, config: AppConfig) -> Result<()> {
    let registry = open_registry(&config).await?;
    let page = registry
        .search(&args.pattern, args.page, args.page_size)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    for entry in &page.entries {
        println!(
            "{:>8}  {}  {}  {}",
            entry.id, entry.phone, entry.owner, entry.created_at
        );
    }
    eprintln!(
        "Page {}/{} ({} matching rows)",
        page.page,
        page.pages().max(1),
        page.total
    );
    Ok(())
}

async fn run_delete(args: DeleteArgs, config: AppConfig) -> Result<()> {
    let Some(phone) = normalize(&args.phone) else {
        anyhow::bail!("Not a valid phone number: {}", args.phone);
    };
    let registry = open_registry(&config).await?;
    if registry.delete_by_key(&phone).await? {
        println!("Deleted {phone}");
    } else {
        println!("{phone} is not registered");
    }
    Ok(())
}

async fn run_export(args: ExportArgs, config: AppConfig) -> Result<()> {
    let registry = open_registry(&config).await?;
    let entries = export_all(registry.as_ref()).await?;
    log::info!("Exporting {} registry rows", entries.len());

    match &args.output {
        Some(path) => {
            write_file_atomic(path, |out| write_entries(out, &entries, args.format))?;
            println!("{}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            write_entries(&mut lock, &entries, args.format)?;
            lock.flush()?;
        }
    }
    Ok(())
}

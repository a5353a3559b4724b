//! cvmatch - comic filename resolution CLI
//!
//! Subcommands:
//! - `resolve`: parse, search the catalog, select, persist and print results
//! - `parse`: parse-only, results persisted per parser
//! - `query`: read stored results back with filters
//! - `config init|show`: write defaults / print the resolved configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cvmatch::app::{self, ParserKind, SelectorKind};
use cvmatch::db::{init_database_pool, MemoryResultStore, RecordFilter, ResultStore, SqliteResultStore};
use cvmatch::input::collect_filenames;
use cvmatch::models::{ParsedItem, ProcessingResult};
use cvmatch::output::{OutputFormat, ResultWriter};
use cvmatch::parser::rules::is_comic_file;
use cvmatch::services::CatalogClient;
use cvmatch::BatchCoordinator;
use cvmatch_common::config::{
    default_config_path, default_database_path, write_toml_config, AppConfig, CliOverrides, Requirements,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cvmatch")]
#[command(about = "Resolve comic archive filenames to ComicVine catalog issues")]
#[command(version = cvmatch::BUILD_VERSION)]
struct Cli {
    /// Configuration file (default: <config dir>/cvmatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database for stored results
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// ComicVine API key
    #[arg(long, global = true)]
    comicvine_key: Option<String>,

    /// Anthropic API key (remote parser / selector)
    #[arg(long, global = true)]
    anthropic_key: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve filenames against the catalog
    Resolve(ResolveArgs),
    /// Parse filenames without catalog access
    Parse(ParseArgs),
    /// Query stored results
    Query(QueryArgs),
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Filenames to process
    files: Vec<String>,

    /// Newline-delimited list of filenames, `-` for stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ParserKind::Rules)]
    parser: ParserKind,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long, value_enum, default_value_t = SelectorKind::Auto)]
    selector: SelectorKind,

    /// Choose matches by hand
    #[arg(long)]
    interactive: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Write results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not persist results
    #[arg(long)]
    no_store: bool,

    /// Skip filenames that already have a stored result
    #[arg(long, conflicts_with = "no_store")]
    skip_existing: bool,
}

#[derive(Args, Debug)]
struct ParseArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    #[arg(long)]
    no_store: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Series contains (case-insensitive)
    #[arg(long)]
    series: Option<String>,
    /// Issue number (zero padding ignored)
    #[arg(long)]
    issue: Option<String>,
    #[arg(long)]
    year: Option<String>,
    /// Publisher contains (case-insensitive)
    #[arg(long)]
    publisher: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration (keys masked)
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workers = match &cli.command {
        Command::Resolve(args) => args.workers,
        Command::Parse(args) => args.workers,
        _ => None,
    };
    let overrides = CliOverrides {
        comicvine_api_key: cli.comicvine_key.clone(),
        anthropic_api_key: cli.anthropic_key.clone(),
        worker_count: workers,
        database_path: cli.database.clone(),
        log_level: cli.verbose.then(|| "debug".to_string()),
    };

    // Only an explicit --config must exist; the default location is optional
    let config = AppConfig::resolve(cli.config.as_deref(), &overrides)?;
    let config_path = cli.config.clone().or_else(default_config_path);

    init_tracing(&config, cli.verbose)?;
    info!("cvmatch {}", cvmatch::BUILD_VERSION);
    match config_path.as_deref() {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        _ => info!("No configuration file, using defaults"),
    }

    match cli.command {
        Command::Resolve(args) => run_resolve(config, args).await,
        Command::Parse(args) => run_parse(config, args).await,
        Command::Query(args) => run_query(config, args).await,
        Command::Config { action } => run_config(config, config_path, action),
    }
}

/// `-v` forces debug, then `RUST_LOG`, then the configured level
fn init_tracing(config: &AppConfig, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .try_init()?;
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .try_init()?;
        }
    }
    Ok(())
}

fn output_sink(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    })
}

async fn open_store(config: &AppConfig, no_store: bool) -> Result<Arc<dyn ResultStore>> {
    if no_store {
        return Ok(Arc::new(MemoryResultStore::new()));
    }
    let db_path = config.database_path();
    let pool = init_database_pool(&db_path)
        .await
        .with_context(|| format!("Database unusable: {}", db_path.display()))?;
    Ok(Arc::new(SqliteResultStore::new(pool)))
}

fn read_sources(source: &SourceArgs, interactive: bool) -> Result<Vec<String>> {
    let reads_stdin = source.input.as_deref() == Some(Path::new("-"))
        || (source.input.is_none() && source.files.is_empty());
    if interactive && reads_stdin {
        bail!("--interactive reads choices from stdin; pass filenames as arguments or with --input FILE");
    }

    let filenames = collect_filenames(&source.files, source.input.as_deref())?;
    if filenames.is_empty() {
        bail!("No filenames given (arguments, --input FILE or stdin)");
    }
    for name in filenames.iter().filter(|name| !is_comic_file(name)) {
        warn!(filename = %name, "Not a .cbz/.cbr file, processing anyway");
    }
    Ok(filenames)
}

/// Cancel `coordinator` on Ctrl-C or SIGTERM
fn cancel_on_signal(coordinator: &BatchCoordinator) {
    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                warn!("Stopping after in-flight items finish");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

async fn run_resolve(config: AppConfig, args: ResolveArgs) -> Result<()> {
    let requirements = app::requirements(args.source.parser, Some(args.selector), args.interactive);
    config.validate(requirements)?;

    let filenames = read_sources(&args.source, args.interactive)?;

    let completion = if requirements.completion {
        Some(app::build_completion(&config)?)
    } else {
        None
    };
    let parser = app::build_parser(args.source.parser, completion.as_ref())?;
    let selector = app::build_selector(args.selector, args.interactive, completion.as_ref())?;
    let search = Arc::new(CatalogClient::from_config(&config)?);
    let store = open_store(&config, args.no_store).await?;

    let filenames = if args.skip_existing {
        let pending = app::skip_existing(store.as_ref(), filenames).await;
        if pending.is_empty() {
            info!("All files are already stored, nothing to do");
            return Ok(());
        }
        pending
    } else {
        filenames
    };

    let coordinator = Arc::new(
        BatchCoordinator::new(parser, search, selector).with_workers(config.worker_count),
    );
    cancel_on_signal(&coordinator);

    let (tx, mut rx) = mpsc::channel::<ProcessingResult>(config.worker_count * 4);
    let batch = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.process_batch(filenames, tx).await })
    };

    let mut writer = ResultWriter::new(args.format, output_sink(args.output.as_deref())?);
    let mut persist_failures = 0usize;
    while let Some(result) = rx.recv().await {
        if let Err(e) = store.save(&result).await {
            persist_failures += 1;
            error!(filename = %result.filename, error = %e, "Failed to persist result");
        }
        writer.write(&result)?;
    }
    writer.finish()?;

    let progress = batch.await.context("Batch task failed")?;
    info!(
        total = progress.total,
        processed = progress.processed,
        successful = progress.successful,
        failed = progress.failed,
        persist_failures,
        "Resolve finished"
    );
    if coordinator.cancellation_token().is_cancelled() {
        warn!("Cancelled: {} of {} files not processed", progress.remaining(), progress.total);
    }
    Ok(())
}

async fn run_parse(config: AppConfig, args: ParseArgs) -> Result<()> {
    let requirements = app::requirements(args.source.parser, None, false);
    config.validate(requirements)?;

    let filenames = read_sources(&args.source, false)?;

    let completion = if requirements.completion {
        Some(app::build_completion(&config)?)
    } else {
        None
    };
    let parser = app::build_parser(args.source.parser, completion.as_ref())?;
    let store = open_store(&config, args.no_store).await?;

    let coordinator = Arc::new(BatchCoordinator::for_parsing(parser).with_workers(config.worker_count));
    cancel_on_signal(&coordinator);

    let (tx, mut rx) = mpsc::channel::<ParsedItem>(config.worker_count * 4);
    let batch = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.parse_batch(filenames, tx).await })
    };

    let mut writer = ResultWriter::new(args.format, output_sink(None)?);
    while let Some(item) = rx.recv().await {
        if let Some(candidate) = &item.candidate {
            if let Err(e) = store.save_parsed(candidate, &item.parser).await {
                error!(filename = %item.filename, error = %e, "Failed to persist parse result");
            }
        }
        writer.write(&item)?;
    }
    writer.finish()?;

    let progress = batch.await.context("Parse task failed")?;
    info!(
        processed = progress.processed,
        parsed = progress.successful,
        failed = progress.failed,
        "Parse finished"
    );
    Ok(())
}

async fn run_query(config: AppConfig, args: QueryArgs) -> Result<()> {
    config.validate(Requirements::default())?;
    let store = open_store(&config, false).await?;

    let filter = RecordFilter {
        series: args.series,
        issue: args.issue,
        year: args.year,
        publisher: args.publisher,
        limit: args.limit,
        offset: args.offset,
    };
    let records = store.query(&filter).await?;
    info!(count = records.len(), "Query complete");

    let mut writer = ResultWriter::new(args.format, output_sink(None)?);
    for record in &records {
        writer.write(record)?;
    }
    writer.finish()?;
    Ok(())
}

fn run_config(config: AppConfig, path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = path.context("No configuration directory on this platform; pass --config PATH")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_toml_config(&AppConfig::default(), &path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let mut shown = config;
            let mask = |key: &mut Option<String>| {
                if key.is_some() {
                    *key = Some("********".to_string());
                }
            };
            mask(&mut shown.comicvine_api_key);
            mask(&mut shown.anthropic_api_key);
            if shown.database_path.is_none() {
                shown.database_path = Some(default_database_path());
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

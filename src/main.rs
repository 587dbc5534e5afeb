use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wikifacts::builder::{EntityOptions, EntityRecordBuilder, PageRecordBuilder, RecordBuilder};
use wikifacts::cache;
use wikifacts::checkpoint::{self, Checkpoint, CheckpointManager, PipelineKind};
use wikifacts::labels::LabelIndex;
use wikifacts::parser::DumpReader;
use wikifacts::pipeline::{self, PipelineConfig};
use wikifacts::sink::{self, ConflictPolicy, OutputFormat, SinkRecord};
use wikifacts::stats::PipelineStats;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikifacts")]
#[command(about = "Extract structured facts from Wikipedia and Wikidata dumps")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tags from wikitext pages
    Pages(PagesArgs),
    /// Extract labels, sitelinks and properties from Wikidata entities
    Entities(EntitiesArgs),
    /// Build and cache the entity label index
    Labels(LabelsArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the dump (.xml or .xml.bz2), or - for stdin
    #[arg(short, long)]
    input: String,

    /// Output directory for records, checkpoint and cache
    #[arg(short, long)]
    output: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
    format: OutputFormat,

    /// Pages between sink flushes and checkpoints
    #[arg(long, default_value_t = wikifacts::config::COMMIT_INTERVAL)]
    commit_interval: u64,

    /// Limit number of pages to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Resume from last checkpoint if available
    #[arg(long)]
    resume: bool,

    /// Clear existing checkpoint and outputs before starting
    #[arg(long)]
    clean: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct PagesArgs {
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct EntitiesArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Flat JSON object of id -> label, or a labels.cache file, instead of a label pass
    #[arg(long, conflicts_with = "labels_from")]
    labels: Option<String>,

    /// Entity dump for the label pass (defaults to the input dump)
    #[arg(long)]
    labels_from: Option<String>,

    /// Force rebuild of the label cache
    #[arg(long)]
    no_cache: bool,

    /// Language for titles, descriptions, labels and the <language>wiki sitelink
    #[arg(long, default_value = wikifacts::config::DEFAULT_LANGUAGE)]
    language: String,
}

#[derive(Args)]
struct LabelsArgs {
    /// Path to the entity dump (.xml or .xml.bz2)
    #[arg(short, long)]
    input: String,

    /// Output directory for the label cache
    #[arg(short, long)]
    output: String,

    #[arg(long, default_value = wikifacts::config::DEFAULT_LANGUAGE)]
    language: String,
}

fn prepare_output(output: &str, clean: bool) -> Result<()> {
    if clean {
        let output_path = Path::new(output);
        if output_path.exists() {
            info!("Cleaning output directory: {}", output);
            fs::remove_dir_all(output_path)
                .with_context(|| format!("Failed to clean output directory: {}", output))?;
        }
    }

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output))
}

/// Checkpoints need a file to validate against, so stdin runs go without.
fn setup_checkpoints(
    args: &RunArgs,
    kind: PipelineKind,
) -> Result<(Option<CheckpointManager>, Option<Checkpoint>)> {
    if args.input == "-" {
        if args.resume {
            warn!("Cannot resume when reading from stdin, starting fresh");
        }
        return Ok((None, None));
    }

    let manager = CheckpointManager::new(&args.input, &args.output, kind)?;

    let checkpoint = if args.resume && !args.clean {
        match checkpoint::load_if_valid(&args.input, &args.output, kind)? {
            Some(cp) => {
                info!(
                    pages = cp.pages_seen,
                    emitted = cp.stats.emitted,
                    "Resuming from checkpoint"
                );
                Some(cp)
            }
            None => {
                info!("No valid checkpoint found, starting fresh");
                None
            }
        }
    } else {
        None
    };

    Ok((Some(manager), checkpoint))
}

fn run_pipeline<B>(
    args: &RunArgs,
    kind: PipelineKind,
    builder: &B,
    policy: ConflictPolicy,
) -> Result<PipelineStats>
where
    B: RecordBuilder,
    B::Record: SinkRecord + 'static,
{
    let (manager, checkpoint) = setup_checkpoints(args, kind)?;

    let mut sink = sink::open_file_sink::<B::Record>(
        &args.output,
        &kind.to_string(),
        args.format,
        policy,
        checkpoint.is_some(),
    )?;

    let reader = DumpReader::open(&args.input)
        .with_context(|| format!("Failed to open dump at: {}", args.input))?;

    let config = PipelineConfig {
        commit_interval: args.commit_interval,
        limit: args.limit,
        show_progress: !args.no_progress,
    };

    info!(input = %args.input, pipeline = %kind, "Starting pipeline");
    let stats = pipeline::run(
        reader,
        builder,
        sink.as_mut(),
        &config,
        checkpoint.as_ref(),
        manager.as_ref(),
    )?;

    if let Some(ref mgr) = manager {
        if let Err(e) = mgr.clear() {
            warn!(error = %e, "Failed to clear checkpoint");
        }
    }

    Ok(stats)
}

fn print_summary(stats: &PipelineStats, label_duration: Option<Duration>, duration: Duration) {
    println!();
    println!("=== Summary ===");
    if let Some(label_duration) = label_duration {
        println!("Label time:         {:.2}s", label_duration.as_secs_f64());
    }
    println!("Extraction time:    {:.2}s", duration.as_secs_f64());
    println!();
    println!("Pages read:         {}", stats.pages);
    println!("Records written:    {}", stats.emitted);
    println!("Dropped:            {}", stats.dropped);
    println!("Rejected:           {}", stats.rejected);
    println!("Duplicates:         {}", stats.duplicates);
    println!("Commits:            {}", stats.commits);
}

fn run_pages(args: PagesArgs) -> Result<()> {
    let args = args.run;
    prepare_output(&args.output, args.clean)?;

    let start = Instant::now();
    let stats = run_pipeline(
        &args,
        PipelineKind::Pages,
        &PageRecordBuilder,
        ConflictPolicy::IgnoreDuplicates,
    )?;
    print_summary(&stats, None, start.elapsed());

    Ok(())
}

/// Loads the label index from the cache, or runs the label pass and caches it.
fn cached_label_index(
    source: &str,
    language: &str,
    output_dir: &str,
    no_cache: bool,
) -> Result<LabelIndex> {
    let cache_path = cache::cache_path(output_dir);

    if no_cache {
        info!("Cache disabled, building fresh label index");
    } else if let Some(index) = cache::try_load_labels(&cache_path, source, language)? {
        return Ok(index);
    } else {
        info!("Building label index (cache miss or invalid)");
    }

    let index = LabelIndex::build(source, language)?;
    if let Err(e) = cache::save_labels(&index, source, language, output_dir) {
        warn!(error = %e, "Failed to save label cache");
    }
    Ok(index)
}

fn run_entities(args: EntitiesArgs) -> Result<()> {
    prepare_output(&args.run.output, args.run.clean)?;

    let start_labels = Instant::now();
    let labels = match args.labels {
        Some(ref path) if path.ends_with(".cache") => cache::load_labels(Path::new(path))?,
        Some(ref path) => LabelIndex::from_json_file(path)?,
        None => {
            let source = args.labels_from.as_deref().unwrap_or(&args.run.input);
            if source == "-" {
                bail!("Labels cannot be built from stdin; pass --labels or --labels-from");
            }
            cached_label_index(source, &args.language, &args.run.output, args.no_cache)?
        }
    };
    let label_duration = start_labels.elapsed();
    info!(
        labels = labels.len(),
        duration_secs = label_duration.as_secs_f64(),
        "Labels ready"
    );

    let builder = EntityRecordBuilder::new(
        &labels,
        EntityOptions {
            language: args.language.clone(),
        },
    );

    let start = Instant::now();
    let stats = run_pipeline(
        &args.run,
        PipelineKind::Entities,
        &builder,
        ConflictPolicy::Append,
    )?;
    print_summary(&stats, Some(label_duration), start.elapsed());

    Ok(())
}

fn run_labels(args: LabelsArgs) -> Result<()> {
    if args.input == "-" {
        bail!("The label cache needs a dump file, not stdin");
    }
    prepare_output(&args.output, false)?;

    let start = Instant::now();
    let index = LabelIndex::build(&args.input, &args.language)?;
    let path = cache::save_labels(&index, &args.input, &args.language, &args.output)?;

    println!();
    println!("=== Summary ===");
    println!("Label time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Labels:             {}", index.len());
    println!("Cache:              {}", path.display());

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Pages(args) => run_pages(args),
        Commands::Entities(args) => run_entities(args),
        Commands::Labels(args) => run_labels(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

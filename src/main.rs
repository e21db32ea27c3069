use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;

use table_watch::capture::platform_source;
use table_watch::classifier::SourceClassifier;
use table_watch::config::Config;
use table_watch::detection::{DetectorRegistry, Recognizer};
use table_watch::error::AppResult;
use table_watch::messaging::{JsonLinesSubscriber, LoggingSubscriber};
use table_watch::pipeline::{Orchestrator, RunEnd};

const LOG_TARGET_STARTUP: &str = "table_watch::startup";

/// Watch a poker table window and stream its state as events
#[derive(Debug, Parser)]
#[command(name = "table-watch", version)]
struct Args {
    /// List capture sources with their classification and exit
    #[arg(long = "list-sources")]
    list_sources: bool,

    /// Replay PNG or JPEG frames from DIR instead of capturing windows
    #[arg(long = "replay", value_name = "DIR")]
    replay: Option<PathBuf>,

    /// Window title reported for replayed frames
    #[arg(long = "title", value_name = "TITLE", requires = "replay")]
    title: Option<String>,

    /// Stop after N detection cycles
    #[arg(long = "max-cycles", value_name = "N")]
    max_cycles: Option<u64>,

    /// Append every delivered event to PATH as JSON lines
    #[arg(long = "jsonl", value_name = "PATH")]
    jsonl: Option<PathBuf>,

    /// Load configuration from PATH
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/TableWatch/logs/table-watch.YYYY-MM-DD.log`.
/// Debug builds also log to the console.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = Config::log_dir().unwrap_or_else(|_| PathBuf::from("logs"));
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "table-watch.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting Table Watch v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);

    let mut system = System::new();
    system.refresh_cpu();
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Logical CPUs: {} (detector pool sized per detector kind)",
        system.cpus().len()
    );
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Recognition: {}, capture: {}",
        if cfg!(feature = "tesseract") { "tesseract" } else { "blank" },
        if cfg!(feature = "window-capture") { "windows + replay" } else { "replay only" }
    );
}

fn load_config(path: Option<&PathBuf>) -> AppResult<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    Ok(config)
}

#[cfg(feature = "tesseract")]
fn recognizer(config: &Config) -> AppResult<Arc<dyn Recognizer>> {
    let recognizer = table_watch::ocr::TesseractRecognizer::new(
        config.ocr.tessdata_path.clone(),
        &config.ocr.language,
    )
    .context("Failed to initialize Tesseract")?;
    Ok(Arc::new(recognizer))
}

#[cfg(not(feature = "tesseract"))]
fn recognizer(_config: &Config) -> AppResult<Arc<dyn Recognizer>> {
    tracing::warn!("Built without the \"tesseract\" feature, every region reads as blank");
    Ok(Arc::new(table_watch::detection::BlankRecognizer))
}

fn list_sources(args: &Args, config: &Config) -> AppResult<()> {
    let mut source = platform_source(args.replay.clone(), args.title.clone())
        .context("No capture source available")?;
    let classifier = SourceClassifier::new()
        .with_exclusions(&config.classifier.extra_exclusions)
        .context("Invalid classifier exclusions")?;
    let sources = source.enumerate().context("Failed to enumerate capture sources")?;

    if sources.is_empty() {
        println!("No capture sources found");
        return Ok(());
    }
    for info in sources {
        let candidate = classifier.candidate(info);
        println!(
            "{:>5.2}  {:<10}  {}  ({})",
            candidate.score,
            candidate.category.to_string(),
            candidate.title,
            candidate.handle
        );
    }
    Ok(())
}

fn run(args: &Args, config: Config) -> AppResult<()> {
    let source = platform_source(args.replay.clone(), args.title.clone())
        .context("No capture source available")?;
    let recognizer = recognizer(&config)?;
    let mut orchestrator = Orchestrator::new(
        config,
        source,
        DetectorRegistry::with_defaults(),
        recognizer,
    )
    .context("Failed to build the pipeline")?;

    orchestrator.add_subscriber(Box::new(LoggingSubscriber::default()));
    if let Some(path) = &args.jsonl {
        let subscriber = JsonLinesSubscriber::create(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        orchestrator.add_subscriber(Box::new(subscriber));
    }

    orchestrator.start().context("Failed to start the pipeline")?;

    match args.max_cycles {
        Some(limit) => {
            let end = orchestrator.wait_for_cycles(limit, Duration::from_millis(50));
            match end {
                RunEnd::CycleLimit => tracing::info!("Stopping: {}", end),
                _ => tracing::warn!(
                    "Stopping after {} of {} cycles: {}",
                    orchestrator.cycles(),
                    limit,
                    end
                ),
            }
        }
        None => {
            println!("Watching... press Enter to stop");
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read from stdin")?;
        }
    }

    orchestrator.stop().context("Failed to stop the pipeline")?;

    let metrics = orchestrator.metrics();
    tracing::info!(
        "Finished after {} cycles in {} mode ({} events dropped)",
        metrics.cycles,
        metrics.mode,
        metrics.events_dropped
    );
    for (kind, performance) in &metrics.per_kind {
        tracing::info!(
            "{}: {} samples, success {:.1}%, p95 {:.1}ms",
            kind,
            performance.samples,
            performance.success_rate * 100.0,
            performance.p95_ms
        );
    }
    match orchestrator.state_view().current() {
        Ok(state) => println!(
            "{}",
            serde_json::to_string_pretty(state.as_ref()).context("Failed to serialize table state")?
        ),
        Err(e) => println!("{}", e),
    }
    Ok(())
}

fn main() -> AppResult<()> {
    let args = Args::parse();
    initialize_tracing();
    log_runtime_environment();

    let config = load_config(args.config.as_ref())?;
    if args.list_sources {
        return list_sources(&args, &config);
    }
    run(&args, config)
}

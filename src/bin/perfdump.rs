//! perfdump - Windows performance-counter scraper.
//!
//! Collects the objects listed in a JSON config at a fixed interval and
//! prints one JSON document per scrape to stdout. Logs go to stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use perfcounters::collector::{Collector, CollectorFactory, ScrapeReport, scrape};
use perfcounters::config::Config;
use perfcounters::model::{CounterInfo, Snapshot};

/// Windows performance-counter scraper.
#[derive(Parser)]
#[command(name = "perfdump", about = "Windows performance-counter scraper", version)]
struct Args {
    /// Path to the JSON config listing objects to collect.
    #[arg(short, long, default_value = "perfdump.json")]
    config: PathBuf,

    /// Scrape interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Stop after this many scrapes (runs until Ctrl-C when omitted).
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    /// Print counter metadata of every configured object and exit.
    #[arg(long)]
    describe: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["perfdump", "perfcounters"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(windows)]
fn system_factory() -> std::io::Result<CollectorFactory> {
    CollectorFactory::system()
}

/// Serves the built-in demo machine where no OS backend exists.
#[cfg(not(windows))]
fn system_factory() -> std::io::Result<CollectorFactory> {
    use perfcounters::collector::perflib::NameTable;
    use perfcounters::collector::{MockPdh, MockPerfSource, PerfDataSource};

    warn!("no OS performance-counter backend on this platform, serving mock data");
    let source = Arc::new(MockPerfSource::typical_system());
    let names = Arc::new(NameTable::from_multi_sz(&source.counter_names()?));
    Ok(CollectorFactory::new()
        .with_perflib(source, names)
        .with_pdh(Arc::new(MockPdh::typical_system())))
}

#[derive(Serialize)]
struct ErrorOutput {
    object: String,
    error: String,
}

#[derive(Serialize)]
struct ScrapeOutput<'a> {
    timestamp: String,
    duration_ms: f64,
    objects: &'a BTreeMap<String, Snapshot>,
    errors: Vec<ErrorOutput>,
}

impl<'a> ScrapeOutput<'a> {
    fn new(report: &'a ScrapeReport) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: report.total.as_secs_f64() * 1000.0,
            objects: &report.snapshots,
            errors: report
                .errors
                .iter()
                .map(|err| ErrorOutput {
                    object: err.object.clone(),
                    error: err.source.to_string(),
                })
                .collect(),
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn describe(collectors: &[Collector], pretty: bool) -> serde_json::Result<()> {
    let info: BTreeMap<&str, Vec<CounterInfo>> = collectors
        .iter()
        .map(|c| (c.object(), c.counter_info()))
        .collect();
    println!("{}", to_json(&info, pretty)?);
    Ok(())
}

fn close_all(collectors: Vec<Collector>) {
    for collector in collectors {
        if let Err(e) = collector.close() {
            warn!("Failed to close collector: {}", e);
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Loaded {} objects from {}",
        config.objects.len(),
        args.config.display()
    );

    let factory = match system_factory() {
        Ok(factory) => factory,
        Err(e) => {
            error!("Failed to initialize collectors: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (mut collectors, errors) = config.build(&factory);
    if collectors.is_empty() {
        error!("No collector could be created ({} failed)", errors.len());
        return ExitCode::FAILURE;
    }
    info!(
        "{} collectors ready, {} failed",
        collectors.len(),
        errors.len()
    );

    if args.describe {
        let result = describe(&collectors, args.pretty);
        close_all(collectors);
        return match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to serialize counter info: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let interval = Duration::from_secs(args.interval);
    let mut scrape_count: u64 = 0;
    let mut exit = ExitCode::SUCCESS;

    info!("Starting scrape loop");
    while running.load(Ordering::SeqCst) {
        let report = scrape(&mut collectors);
        scrape_count += 1;
        debug!(
            "Scrape #{}: {} objects, {} errors in {:?}",
            scrape_count,
            report.snapshots.len(),
            report.errors.len(),
            report.total
        );

        match to_json(&ScrapeOutput::new(&report), args.pretty) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize scrape: {}", e);
                exit = ExitCode::FAILURE;
                break;
            }
        }

        if args.count.is_some_and(|count| scrape_count >= count) {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down after {} scrapes", scrape_count);
    close_all(collectors);
    exit
}

//! Command-line front end: download every URL in a list file.

use bulk_dl::{BatchReport, Config, Dispatcher, Event, input, run_with_shutdown};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "bulk_dl=warn";

/// Exit code when at least one URL failed
const EXIT_FAILURES: u8 = 1;
/// Exit code for setup errors (missing input, bad config)
const EXIT_SETUP: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "bulk-dl", version, about = "Download every URL in a list, in parallel")]
struct Cli {
    /// File with one URL per line
    #[arg(short, long, default_value = "urls.txt")]
    input: PathBuf,

    /// Directory downloads are written to [default: downloads]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of parallel downloads, 0 is treated as 1 [default: 10]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Read timeout in seconds [default: 120]
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    read_timeout: Option<u64>,

    /// Connect timeout in seconds [default: 5]
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// JSON configuration file; flags given on the command line take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> bulk_dl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(output) = &self.output {
            config.download_dir = output.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
        if let Some(secs) = self.read_timeout {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_FAILURES),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> bulk_dl::Result<BatchReport> {
    let config = cli.load_config()?;
    let urls = input::read_url_list(&cli.input).await?;

    if urls.is_empty() {
        println!("No URLs found in {}", cli.input.display());
        return Ok(BatchReport::default());
    }

    let workers = bulk_dl::effective_workers(config.workers, urls.len());
    let download_dir = config.download_dir.clone();
    let dispatcher = Dispatcher::new(config)?;

    println!(
        "Downloading {} files into {} with {} workers...",
        urls.len(),
        download_dir.display(),
        workers
    );

    let printer = tokio::spawn(print_progress(dispatcher.subscribe()));
    let report = run_with_shutdown(&dispatcher, urls).await?;
    drop(dispatcher);
    printer.await.ok();

    print_summary(&report);
    Ok(report)
}

async fn print_progress(mut events: tokio::sync::broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(Event::Completed { url, path, .. }) => {
                println!("✅ Downloaded: {url} -> {}", path.display());
            }
            Ok(Event::Failed { url, error, .. }) => {
                println!("❌ Failed: {url} -> {error}");
            }
            Ok(Event::BatchFinished { .. }) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress output fell behind, some lines were skipped");
            }
        }
    }
}

fn print_summary(report: &BatchReport) {
    println!(
        "\nDone: {} succeeded, {} failed",
        report.succeeded_count(),
        report.failed_count()
    );

    if report.is_success() {
        return;
    }

    println!("\nFailed downloads:");
    for (url, error) in report.failures() {
        println!("  - {url}: {error}");
    }
}

//! CLI entry point for the recipe importer.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use importer_core::{
    DuplicateIndex, ImportJob, ImporterConfig, IndexError, LogFileReporter, MultiReporter,
    Orchestrator, RecipeApi, ServerClient, Sleeper, TokioSleeper, TracingReporter,
    read_url_file, render_summary, resolve_config_path,
};
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::{BarReporter, should_use_progress_bar};

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Failure,
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure.into()
        }
    }
}

/// Priority: `RUST_LOG` > quiet flag > verbose flag > default (info).
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn spawn_interrupt_watcher(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current URL");
            flag.store(true, Ordering::SeqCst);
        }
    });
}

fn load_config(args: &Args) -> Result<ImporterConfig> {
    let path = resolve_config_path(args.config.as_deref());
    let mut config = ImporterConfig::load(&path)
        .with_context(|| format!("cannot load configuration from {}", path.display()))?;
    if let Some(secs) = args.delay {
        config = config.with_delay_between_requests(Duration::from_secs(secs));
    }
    if let Some(attempts) = args.max_attempts {
        config = config.with_max_attempts(attempts);
    }
    info!(
        server = %config.server_url(),
        delay_secs = config.delay_between_requests().as_secs(),
        max_attempts = config.max_attempts(),
        "configuration loaded"
    );
    Ok(config)
}

async fn run(args: Args) -> Result<ProcessExit> {
    let config = load_config(&args)?;

    let urls = read_url_file(&args.url_file)
        .with_context(|| format!("cannot read URL list {}", args.url_file.display()))?;
    let job = ImportJob::new(urls)
        .starting_at(args.start_from)
        .with_max(args.max_imports);
    info!(
        total = job.urls().len(),
        start = job.start(),
        in_range = job.len_in_range(),
        "URL list loaded"
    );
    if job.len_in_range() == 0 {
        info!("no URLs in the requested range; nothing to do");
        return Ok(ProcessExit::Success);
    }

    // A bad output path fails before the recipe list is walked.
    let log_file = args
        .output
        .as_deref()
        .map(|path| {
            LogFileReporter::create(path)
                .with_context(|| format!("cannot open output file {}", path.display()))
        })
        .transpose()?;

    let interrupt = Arc::new(AtomicBool::new(false));
    spawn_interrupt_watcher(Arc::clone(&interrupt));
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper::new(Arc::clone(&interrupt)));
    let api: Arc<dyn RecipeApi> =
        Arc::new(ServerClient::new(&config).context("cannot create HTTP client")?);

    info!("building duplicate index from server recipe list");
    let index = match DuplicateIndex::build(
        api.as_ref(),
        &config.retry_policy(),
        sleeper.as_ref(),
        config.page_size(),
    )
    .await
    {
        Ok(index) => index,
        Err(IndexError::Interrupted { page }) => {
            warn!(page, "interrupted while building duplicate index; nothing imported");
            return Ok(ProcessExit::Interrupted);
        }
        Err(error) => {
            return Err(error).context("cannot build duplicate index; refusing to import");
        }
    };

    let mut reporter = MultiReporter::new().with(TracingReporter);
    if let Some(log) = log_file {
        reporter.push(Box::new(log));
    }
    if should_use_progress_bar(io::stderr().is_terminal(), args.quiet) {
        reporter.push(Box::new(BarReporter::new(job.len_in_range())));
    }

    let orchestrator = Orchestrator::new(config, api, sleeper).with_interrupt(interrupt);
    let run = orchestrator.run(&job, &index, &mut reporter).await;

    for line in render_summary(&run) {
        println!("{line}");
    }

    if run.stats.was_interrupted() {
        Ok(ProcessExit::Interrupted)
    } else {
        Ok(ProcessExit::Success)
    }
}

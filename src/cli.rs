//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk import recipes into a self-hosted recipe server.
///
/// Reads one URL per line, skips non-recipe links and recipes the server
/// already has, then asks the server to scrape and save each remaining page.
#[derive(Parser, Debug)]
#[command(name = "recipe-importer")]
#[command(author, version, about)]
pub struct Args {
    /// File with one recipe URL per line (`#` starts a comment)
    pub url_file: PathBuf,

    /// 0-based index of the first URL to process (resume point)
    #[arg(long, default_value_t = 0)]
    pub start_from: usize,

    /// Process at most this many URLs
    #[arg(long)]
    pub max_imports: Option<usize>,

    /// Append per-URL results and the final tally to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (default: XDG config dir, then ./config.conf)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait between URLs, overriding the config file (0 disables pacing)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub delay: Option<u64>,

    /// Attempts per phase before giving up, overriding the config file (1-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Crawl blogs and download the media they post.
///
/// Blogs named on the command line are fetched with default per-blog options
/// unless the config file describes them; with no names, every blog in the
/// config file is fetched.
#[derive(Parser, Debug)]
#[command(name = "blogfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Blog names to fetch
    pub blogs: Vec<String>,

    /// Path to a TOML config file (default: $XDG_CONFIG_HOME/blogfetch/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory; each blog gets its own subdirectory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Netscape cookies.txt to send with platform requests
    #[arg(long)]
    pub cookies: Option<PathBuf>,

    /// Maximum simultaneous connections (1-400)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u32).range(1..=400))]
    pub concurrency: Option<u32>,

    /// Maximum attempts per media file (1-100)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: Option<u32>,

    /// Bandwidth budget in KiB/s shared by all connections (0 for unlimited)
    #[arg(short = 'b', long)]
    pub bandwidth: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Log level used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

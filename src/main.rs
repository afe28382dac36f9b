//! CLI entry point for blogfetch.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use blogfetch_core::auth::load_cookie_file;
use blogfetch_core::{
    BlogSettings, CookieBridge, FileConfig, HttpClient, JobState, QueueManager, SharedCookieService,
    load_config,
};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = load_config(args.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration")?;

    let blogs = select_blogs(&config, &args.blogs);
    if blogs.is_empty() {
        info!("No blogs to fetch. Name blogs as arguments or list them in the config file.");
        return Ok(());
    }

    let cookies = match &args.cookies {
        Some(path) => {
            let parsed = load_cookie_file(path)
                .with_context(|| format!("failed to load cookies from {}", path.display()))?;
            for (line, reason) in &parsed.warnings {
                warn!(line, reason = %reason, "skipped cookie line");
            }
            let service = SharedCookieService::new();
            service.set_all(parsed.cookies);
            info!(cookies = service.len(), "cookies loaded");
            Some(Arc::new(service) as Arc<dyn CookieBridge>)
        }
        None => None,
    };

    let settings = Arc::new(config.settings);
    let client = HttpClient::new(&settings, cookies).context("failed to build HTTP client")?;

    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let manager = QueueManager::new(Arc::clone(&settings), client).with_progress(progress_tx);
    tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            debug!(
                blog = %event.blog,
                item = %event.item_id,
                bytes = event.progress.bytes_received,
                total = ?event.progress.total_bytes,
                rate = event.progress.bytes_per_sec,
                "progress"
            );
        }
    });

    let mut names = Vec::with_capacity(blogs.len());
    for blog in blogs {
        let job = manager.add_blog(blog)?;
        names.push(job.name().to_string());
    }
    for name in &names {
        manager.enqueue(name)?;
    }
    info!(blogs = names.len(), output = %settings.download_location.display(), "blogfetch starting");

    tokio::select! {
        () = manager.wait_idle() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            warn!("interrupted, stopping downloads");
            manager.shutdown().await;
        }
    }

    let mut failed = 0;
    for job in manager.jobs() {
        let counters = job.counters().snapshot();
        if job.state() == JobState::Failed {
            failed += 1;
        }
        info!(
            blog = %job.name(),
            state = %job.state(),
            discovered = counters.discovered,
            downloaded = counters.downloaded,
            skipped = counters.skipped,
            failed = counters.failed,
            "Download complete"
        );
    }
    if failed > 0 {
        bail!("{failed} blog(s) failed");
    }
    Ok(())
}

fn apply_overrides(config: &mut FileConfig, args: &Args) {
    let settings = &mut config.settings;
    if let Some(output) = &args.output {
        settings.download_location.clone_from(output);
    }
    if let Some(concurrency) = args.concurrency {
        settings.concurrent_connections = concurrency;
    }
    if let Some(max_retries) = args.max_retries {
        settings.max_number_of_retries = max_retries;
    }
    if let Some(bandwidth) = args.bandwidth {
        settings.bandwidth_kb_per_sec = bandwidth;
    }
}

/// Blogs named on the command line (config entry when present), or every configured blog.
fn select_blogs(config: &FileConfig, names: &[String]) -> Vec<BlogSettings> {
    if names.is_empty() {
        return config.blogs.clone();
    }
    names
        .iter()
        .map(|name| {
            config
                .blogs
                .iter()
                .find(|blog| blog.name.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| BlogSettings::new(name.as_str()))
        })
        .collect()
}

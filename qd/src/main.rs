//! qd - CLI entry point for the queued daemon

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use queued::cli::{Cli, Command, OutputFormat};
use queued::config::Config;
use queued::executor::CommandExecutor;
use queued::rate::RateLimiter;
use queued::scheduler::Scheduler;
use queued::source::{CommandSource, JobSource};
use queuestore::WorkStore;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO default
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Refresh => cmd_refresh(&config).await,
        Command::Status { format } => cmd_status(&config, format),
    }
}

/// Run the scheduler loop in the foreground until Ctrl-C
async fn cmd_run(config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let store = WorkStore::open_exclusive(&config.state_dir).context("Failed to open state directory")?;
    let limiter = RateLimiter::with_persistence(config.rate_limit(), config.last_action_path());
    let source = CommandSource::new(config.source.command.clone(), config.source_timeout());
    let executor = CommandExecutor::new(config.executor.command.clone());

    info!(
        state_dir = %config.state_dir.display(),
        tick_interval_secs = config.tick_interval_secs,
        rate_limit_secs = config.rate_limit_secs,
        "queued starting"
    );

    let scheduler = Scheduler::new(store, limiter, Box::new(source), Box::new(executor));

    // Cooperative shutdown: the flag flips on Ctrl-C and the loop observes it
    // between ticks, so an in-flight item always finishes and commits.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received; finishing current tick");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(config.tick_interval(), shutdown_rx).await;
    Ok(())
}

/// One-shot cache refresh and queue rebuild, no processing
async fn cmd_refresh(config: &Config) -> Result<()> {
    config.validate_source().context("Invalid configuration")?;

    let store = WorkStore::open_exclusive(&config.state_dir).context("Failed to open state directory")?;

    let before = store.status()?;
    if before.cache_exists {
        println!("Current: {} cached, {} archived, {} pending", before.total, before.archived, before.pending);
    } else {
        println!("No cache found (first run)");
    }

    let source = CommandSource::new(config.source.command.clone(), config.source_timeout());
    let ids = source.fetch_all().await.context("Source fetch failed")?;
    store.refresh_cache(&ids)?;
    let pending = store.recompute_queue()?;

    let after = store.status()?;
    println!("Updated: {} cached, {} archived, {} pending", after.total, after.archived, after.pending);

    let queue = store.queue_ids()?;
    if queue.is_empty() {
        println!("All items processed; queue is empty.");
    } else {
        println!("Next items (showing up to 5):");
        for (i, id) in queue.iter().take(5).enumerate() {
            println!("  {}. {}", i + 1, id);
        }
        if pending > 5 {
            println!("  ... and {} more", pending - 5);
        }
    }
    Ok(())
}

/// Show durable state counters without taking the writer lock
fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let store = WorkStore::open(&config.state_dir).context("Failed to open state directory")?;
    let status = store.status()?;

    // Reads the persisted timestamp only; may be momentarily stale while a
    // daemon is mid-commit, which is fine for reporting.
    let limiter = RateLimiter::with_persistence(config.rate_limit(), config.last_action_path());
    let last_action = limiter.last_action();

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "total": status.total,
                "archived": status.archived,
                "pending": status.pending,
                "cache_exists": status.cache_exists,
                "queue_exists": status.queue_exists,
                "archive_exists": status.archive_exists,
                "last_action": last_action.map(|ts| ts.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("State dir:   {}", config.state_dir.display());
            println!("Total items: {}", status.total);
            println!("Archived:    {}", status.archived);
            println!("Pending:     {}", status.pending);
            match last_action {
                Some(ts) => println!("Last action: {}", ts.to_rfc3339()),
                None => println!("Last action: never"),
            }
            if !status.cache_exists {
                warn!("no cache file yet; run `qd refresh` or start the daemon");
            }
        }
    }
    Ok(())
}

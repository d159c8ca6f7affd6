//! # Reward Scheduler
//!
//! Daemon that expires points earned on old transactions.
//!
//! ## Usage
//! ```bash
//! # Run with the platform config file (or defaults)
//! reward-scheduler
//!
//! # Explicit config file
//! reward-scheduler --config ./scheduler.toml
//!
//! # Single tick, then exit
//! reward-scheduler --once
//! ```
//!
//! ## Startup Sequence
//! ```text
//! init tracing ─► load config ─► open database (migrations)
//!       ─► load multipliers ─► spawn scheduler ─► wait for signal
//!       ─► shutdown scheduler ─► close pool
//! ```
//!
//! Several copies may run against the same database; the lease table
//! lets only one of them work per tick.

use anyhow::Context;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reward_ledger::{Ledger, LedgerConfig};

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Some(args) => args,
        None => return Ok(()),
    };

    init_tracing();
    info!("Starting reward scheduler...");

    let config = LedgerConfig::load(args.config).context("failed to load configuration")?;
    info!(
        db_path = %config.database.path.display(),
        interval_mins = config.scheduler.interval_mins,
        window = %config.expiration_window(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let ledger = Ledger::open(config).await.context("failed to open ledger")?;
    let db = ledger.database().clone();

    let status = db.migration_status().await?;
    info!(applied = status.applied, total = status.total, "Database ready");

    let scheduler = ledger.scheduler()?;

    if args.once {
        let report = scheduler.run_tick().await?;
        info!(
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            points = report.points_expired,
            "Single tick complete"
        );
        db.close().await;
        return Ok(());
    }

    if !ledger.config().scheduler.enabled {
        warn!("Scheduler disabled in configuration, exiting");
        db.close().await;
        return Ok(());
    }

    let (handle, task) = scheduler.spawn();

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Scheduler already stopped");
    }
    if let Err(e) = task.await {
        error!(error = %e, "Scheduler task panicked");
    }

    db.close().await;
    info!("Reward scheduler stopped");
    Ok(())
}

fn parse_args() -> Option<Args> {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < argv.len() {
                    args.config = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                }
            }
            "--once" => args.once = true,
            "--help" | "-h" => {
                println!("Reward Scheduler");
                println!();
                println!("Usage: reward-scheduler [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("      --once            Run one expiration tick and exit");
                println!("  -h, --help            Show this help message");
                return None;
            }
            _ => {}
        }
        i += 1;
    }

    Some(args)
}

/// Initializes logging. `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reward=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping scheduler...");
}

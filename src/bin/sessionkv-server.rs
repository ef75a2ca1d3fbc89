//! sessionkv Server Binary
//!
//! Hosts the session store: restores the snapshot, runs the expiry sweeper
//! and writes a final snapshot on Ctrl-C.

use clap::Parser;
use sessionkv::{Config, FlushPolicy, SessionService};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// sessionkv Server - In-Memory Session Store
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Snapshot file location
    #[arg(short, long, default_value = "./data/sessions.json")]
    snapshot: PathBuf,

    /// Keep sessions in memory only
    #[arg(long, default_value_t = false)]
    no_persistence: bool,

    /// When changes reach disk: write-through or batched
    #[arg(long, default_value_t = FlushPolicy::WriteThrough)]
    flush_policy: FlushPolicy,

    /// Deadline for background flushes in seconds
    #[arg(long, default_value_t = 5)]
    flush_timeout: u64,

    /// Expiry sweeper interval in seconds
    #[arg(long, default_value_t = 30)]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sessionkv=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = Config::default()
        .with_snapshot_path(&args.snapshot)
        .with_flush_policy(args.flush_policy)
        .with_flush_timeout(Duration::from_secs(args.flush_timeout))
        .with_sweep_interval(Duration::from_secs(args.sweep_interval.max(1)));
    if args.no_persistence {
        config = config.without_persistence();
    }

    info!(
        "Starting sessionkv with snapshot {} ({} policy, sweep every {}s)",
        args.snapshot.display(),
        args.flush_policy,
        args.sweep_interval
    );

    let service = SessionService::start(config);
    info!(
        restored = service.restored(),
        corrupted = service.snapshot_corrupted(),
        "Session store ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    service.shutdown().await?;
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dayspool::config::SpoolConfig;
use dayspool::daemon::Daemon;
use dayspool::logging;
use spool_transport::local::LocalDirTransport;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "dayspool", version, about = "Mirrors date-partitioned capture directories onto remote storage")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "DAYSPOOL_CONFIG", default_value = "dayspool.toml")]
    config: PathBuf,

    /// Log would-be deletions without removing anything
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = SpoolConfig::load(&args.config)?;
    if args.dry_run {
        config.dry_run_delete = true;
    }

    let _guard = logging::init_logging(config.log_dir.as_deref(), args.verbose, args.quiet)?;

    // The core is transport-agnostic; the shipped adapter mirrors into a
    // locally reachable destination root (typically a mounted share).
    let transport = Arc::new(LocalDirTransport::new(
        &config.remote_root,
        config.connect_timeout(),
    ));

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current cycle");
            stopper.cancel();
        }
    });

    Daemon::new(config, transport).run(cancel).await?;
    Ok(())
}

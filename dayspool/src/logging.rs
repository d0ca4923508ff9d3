//! Logging setup.
//!
//! Console output always; when a log directory is configured, a second
//! non-ANSI layer writes to a daily-rotated file. The returned guard must
//! stay alive for the lifetime of the process so buffered file output is
//! flushed.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "dayspool=info,spool_transport=info";

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins over the verbosity switches when set.
pub fn init_logging(
    log_dir: Option<&Path>,
    verbose: bool,
    quiet: bool,
) -> Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "dayspool=debug,spool_transport=debug"
    } else if quiet {
        "dayspool=warn,spool_transport=warn"
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| Error::io_path("creating log directory", dir, e))?;
            let appender = tracing_appender::rolling::daily(dir, "dayspool.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .map_err(|e| Error::Other(format!("Failed to set global subscriber: {e}")))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| Error::Other(format!("Failed to set global subscriber: {e}")))?;
            Ok(None)
        }
    }
}

//! Partition upload scheduler.
//!
//! Walks a partition subtree, dispatching one transfer per regular file in
//! sorted order. Each file either gets a spawned worker (budget slot
//! granted) or runs inline in the sweeping task itself, which blocks the
//! sweep until it finishes — bounded concurrency with backpressure instead
//! of an unbounded queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use spool_transport::Transport;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::budget::TransferBudget;
use crate::partition::DayPartition;
use crate::transfer::{self, TransferJob, TransferOptions};
use crate::{Error, Result, fsutil};

/// Uploads the contents of day partitions through a shared transport.
pub struct PartitionUploader {
    transport: Arc<dyn Transport>,
    budget: Arc<TransferBudget>,
    opts: TransferOptions,
}

impl PartitionUploader {
    pub fn new(
        transport: Arc<dyn Transport>,
        budget: Arc<TransferBudget>,
        opts: TransferOptions,
    ) -> Self {
        Self {
            transport,
            budget,
            opts,
        }
    }

    pub fn budget(&self) -> &TransferBudget {
        &self.budget
    }

    /// Sweep one day partition: upload every file under it, mirror the
    /// directory layout below `processed_root`, and remove emptied
    /// directories. Failures abandon the partition for this cycle only.
    pub async fn process_partition(
        &self,
        partition: &DayPartition,
        processed_root: &Path,
        is_today: bool,
    ) {
        debug!(partition = %partition.label, is_today, "processing partition");
        self.process_dir(
            partition.path.clone(),
            partition.label.clone(),
            processed_root.join(&partition.label),
            is_today,
        )
        .await;
    }

    fn process_dir(
        &self,
        dir: PathBuf,
        remote_dir: String,
        processed_dir: PathBuf,
        is_today: bool,
    ) -> BoxFuture<'_, ()> {
        async move {
            // Pre-flight: create the remote directory once per level so the
            // cost isn't paid per file.
            match self.transport.connect().await {
                Ok(mut conn) => {
                    let entered = conn.change_or_create_dir(&remote_dir).await;
                    conn.close().await;
                    if let Err(e) = entered {
                        warn!(dir = %remote_dir, error = %e, "remote directory unavailable, skipping this cycle");
                        return;
                    }
                }
                Err(e) => {
                    warn!(dir = %remote_dir, error = %e, "connect failed in pre-flight, skipping this cycle");
                    return;
                }
            }

            if let Err(e) = fsutil::ensure_dir_all(&processed_dir).await {
                warn!(error = %e, "cannot create processed directory, skipping this cycle");
                return;
            }

            let names = match list_sorted(&dir).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot list partition, skipping this cycle");
                    return;
                }
            };

            let mut workers = JoinSet::new();
            for name in names {
                let path = dir.join(&name);
                // an entry may have been uploaded or purged since listing
                let Ok(meta) = tokio::fs::metadata(&path).await else {
                    continue;
                };

                if meta.is_file() {
                    let job = TransferJob {
                        local_path: path,
                        remote_dir: remote_dir.clone(),
                        remote_name: name.clone(),
                        processed_path: processed_dir.join(&name),
                        priority: is_today,
                    };
                    match self.budget.try_acquire(is_today) {
                        Some(slot) => {
                            let transport = self.transport.clone();
                            let opts = self.opts;
                            workers.spawn(async move {
                                let _slot = slot;
                                transfer::run_transfer(transport.as_ref(), &job, opts).await;
                            });
                        }
                        None => {
                            // budget exhausted: transfer in this task,
                            // blocking the sweep until it completes
                            let _slot = self.budget.inline_slot(is_today);
                            transfer::run_transfer(self.transport.as_ref(), &job, self.opts).await;
                        }
                    }
                } else if meta.is_dir() {
                    // nested grouping below the date partition
                    let child_remote = format!("{remote_dir}/{name}");
                    self.process_dir(path, child_remote, processed_dir.join(&name), is_today)
                        .await;
                }
            }

            while workers.join_next().await.is_some() {}

            // Best-effort: succeeds only once every child is gone; a
            // non-empty directory is simply left for the next cycle.
            let _ = tokio::fs::remove_dir(&dir).await;
        }
        .boxed()
    }
}

/// Direct children of `dir` by name, sorted lexically for deterministic
/// dispatch. Names that are not valid UTF-8 are skipped.
async fn list_sorted(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_path("listing directory", dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("listing directory", dir, e))?
    {
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!(name = ?raw, "skipping non-UTF-8 entry name"),
        }
    }
    names.sort();
    Ok(names)
}

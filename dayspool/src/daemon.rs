//! The top-level poll loop.
//!
//! Each tick rebuilds the partition index of the incoming root and re-arms
//! up to three supervisory tasks — today's uploader, the backlog uploader,
//! and the retention purger — each only when its previous incarnation has
//! finished. Ticks never wait for tasks to finish; a slow sweep simply
//! spans multiple poll intervals.

use std::sync::Arc;

use spool_transport::Transport;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::budget::TransferBudget;
use crate::config::SpoolConfig;
use crate::partition::{self, DayPartition};
use crate::transfer::TransferOptions;
use crate::uploader::PartitionUploader;
use crate::{Result, fsutil, purge};

/// The upload and retention daemon.
pub struct Daemon {
    config: Arc<SpoolConfig>,
    uploader: Arc<PartitionUploader>,
}

/// Handles for the three supervisory tasks, re-armed per category only
/// when the previous run has finished.
#[derive(Default)]
struct Supervised {
    today: Option<JoinHandle<()>>,
    backlog: Option<JoinHandle<()>>,
    purge: Option<JoinHandle<()>>,
}

fn idle(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_none_or(JoinHandle::is_finished)
}

impl Daemon {
    pub fn new(config: SpoolConfig, transport: Arc<dyn Transport>) -> Self {
        let budget = Arc::new(TransferBudget::new(
            config.max_workers,
            config.reserved_priority_workers,
        ));
        let opts = TransferOptions {
            error_backoff: config.error_backoff(),
            transfer_timeout: config.transfer_timeout(),
        };
        Self {
            config: Arc::new(config),
            uploader: Arc::new(PartitionUploader::new(transport, budget, opts)),
        }
    }

    /// Run the poll loop until `cancel` fires.
    ///
    /// Supervisory tasks log their own failures so one bad cycle never
    /// kills the loop; only startup errors propagate out of here.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        fsutil::ensure_dir_all_with_op("creating processed root", &self.config.processed_root)
            .await?;

        info!(
            version = crate::VERSION,
            incoming = %self.config.incoming_root.display(),
            max_workers = self.config.max_workers,
            "dayspool started"
        );

        let mut tasks = Supervised::default();
        while !cancel.is_cancelled() {
            self.tick(&mut tasks).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("poll loop stopped");
        Ok(())
    }

    async fn tick(&self, tasks: &mut Supervised) {
        match partition::scan_partitions(&self.config.incoming_root).await {
            Ok(mut partitions) => {
                // newest first, so today (if present) leads
                partitions.reverse();
                self.arm_uploaders(tasks, partitions);
            }
            Err(e) => {
                warn!(error = %e, "cannot index incoming root, skipping uploads this cycle");
            }
        }

        if idle(&tasks.purge) {
            let config = self.config.clone();
            tasks.purge = Some(tokio::spawn(async move {
                match purge::purge_expired(
                    &config.processed_root,
                    config.retain_days,
                    config.dry_run_delete,
                )
                .await
                {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "purge sweep finished"),
                    Err(e) => error!(error = %e, "purge sweep failed"),
                }
            }));
        }
    }

    /// Re-arm the today and backlog tasks over a newest-first index.
    fn arm_uploaders(&self, tasks: &mut Supervised, partitions: Vec<DayPartition>) {
        let mut backlog_from = 0;
        if let Some(first) = partitions.first()
            && first.is_today()
        {
            backlog_from = 1;
            if idle(&tasks.today) {
                let uploader = self.uploader.clone();
                let config = self.config.clone();
                let today = first.clone();
                tasks.today = Some(tokio::spawn(async move {
                    uploader
                        .process_partition(&today, &config.processed_root, true)
                        .await;
                }));
            }
        }

        if partitions.len() > backlog_from && idle(&tasks.backlog) {
            // single sequential sweep, oldest to most recent
            let mut backlog = partitions[backlog_from..].to_vec();
            backlog.reverse();

            let uploader = self.uploader.clone();
            let config = self.config.clone();
            tasks.backlog = Some(tokio::spawn(async move {
                for partition in &backlog {
                    uploader
                        .process_partition(partition, &config.processed_root, false)
                        .await;
                }
            }));
        }
    }
}

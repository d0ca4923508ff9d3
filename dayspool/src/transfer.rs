//! Single-file transfer worker.
//!
//! A transfer attempt never propagates an error: every failure is terminal
//! for this attempt, logged, and resolved by the next poll cycle finding
//! the file still in place. The daemon prioritizes liveness of the polling
//! loop over surfacing individual transfer failures.

use std::path::PathBuf;
use std::time::Duration;

use spool_transport::{Transport, TransportError};
use tracing::{error, info, warn};

use crate::fsutil;

/// One file to move through the transport and into the processed store.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub local_path: PathBuf,
    pub remote_dir: String,
    pub remote_name: String,
    pub processed_path: PathBuf,
    pub priority: bool,
}

/// Knobs shared by every transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Sleep after a connect or transfer failure before giving the slot back.
    pub error_backoff: Duration,
    /// Bound on a single `put_file`; `None` leaves it unbounded.
    pub transfer_timeout: Option<Duration>,
}

/// Upload one file and relocate it into the processed store.
///
/// On success the local file ends up at `job.processed_path`. On any
/// failure the local file stays at `job.local_path` for a retry next
/// cycle. A failed relocation after a successful upload is logged and
/// accepted: the file will be uploaded again later and overwrite its
/// remote copy (at-least-once delivery).
pub async fn run_transfer(transport: &dyn Transport, job: &TransferJob, opts: TransferOptions) {
    let mut conn = match transport.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, file = %job.local_path.display(), "connect failed, backing off");
            tokio::time::sleep(opts.error_backoff).await;
            return;
        }
    };

    if let Err(e) = conn.change_or_create_dir(&job.remote_dir).await {
        warn!(dir = %job.remote_dir, error = %e, "cannot enter or create remote directory");
        conn.close().await;
        return;
    }

    info!(file = %job.local_path.display(), dir = %job.remote_dir, "uploading");

    let put = conn.put_file(&job.local_path, &job.remote_name, true);
    let result = match opts.transfer_timeout {
        Some(limit) => tokio::time::timeout(limit, put)
            .await
            .unwrap_or_else(|_| Err(TransportError::timed_out(&job.remote_name))),
        None => put.await,
    };

    match result {
        Ok(()) => {
            conn.close().await;
            move_to_processed(job).await;
        }
        Err(e) => {
            error!(file = %job.local_path.display(), error = %e, "transfer failed, backing off");
            conn.close().await;
            tokio::time::sleep(opts.error_backoff).await;
        }
    }
}

/// Relocate an uploaded file into the processed store.
async fn move_to_processed(job: &TransferJob) {
    // The purger may have deleted the processed day directory while files
    // for that day were still coming in; recreate it.
    if let Some(parent) = job.processed_path.parent() {
        if let Err(e) = fsutil::ensure_dir_all(parent).await {
            warn!(error = %e, "cannot create processed directory, leaving file in incoming");
            return;
        }
    }

    match fsutil::move_file(&job.local_path, &job.processed_path).await {
        Ok(()) => {
            info!(file = %job.processed_path.display(), "moved to processed store");
        }
        Err(e) => {
            // Remote copy stands; the file will be re-uploaded next cycle
            // and overwrite it.
            warn!(
                file = %job.local_path.display(),
                error = %e,
                "cannot move uploaded file, possible sharing violation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_transport::mock::MockTransport;

    fn quick_opts() -> TransferOptions {
        TransferOptions {
            error_backoff: Duration::from_millis(5),
            transfer_timeout: Some(Duration::from_secs(5)),
        }
    }

    async fn job_in(dir: &std::path::Path) -> TransferJob {
        let local_path = dir.join("incoming").join("a.jpg");
        fsutil::ensure_dir_all(local_path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&local_path, b"frame").await.unwrap();
        TransferJob {
            local_path,
            remote_dir: "2024-05-01".to_string(),
            remote_name: "a.jpg".to_string(),
            processed_path: dir.join("processed").join("2024-05-01").join("a.jpg"),
            priority: true,
        }
    }

    #[tokio::test]
    async fn success_uploads_and_relocates() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let job = job_in(dir.path()).await;

        run_transfer(&transport, &job, quick_opts()).await;

        assert_eq!(
            transport.uploads(),
            vec![("2024-05-01".to_string(), "a.jpg".to_string())]
        );
        assert!(!job.local_path.exists());
        assert_eq!(
            tokio::fs::read(&job.processed_path).await.unwrap(),
            b"frame"
        );
    }

    #[tokio::test]
    async fn connect_failure_leaves_file_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.fail_next_connects(1);
        let job = job_in(dir.path()).await;

        run_transfer(&transport, &job, quick_opts()).await;

        assert!(transport.uploads().is_empty());
        assert!(job.local_path.exists());
        assert!(!job.processed_path.exists());

        // the injected failure is spent; the retry completes the transfer
        run_transfer(&transport, &job, quick_opts()).await;
        assert_eq!(transport.uploads().len(), 1);
        assert!(!job.local_path.exists());
        assert!(job.processed_path.exists());
    }

    #[tokio::test]
    async fn put_failure_keeps_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.fail_puts_of("a.jpg");
        let job = job_in(dir.path()).await;

        run_transfer(&transport, &job, quick_opts()).await;

        assert!(transport.uploads().is_empty());
        assert!(job.local_path.exists());
    }

    #[tokio::test]
    async fn remote_dir_failure_abandons_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.fail_dir("2024-05-01");
        let job = job_in(dir.path()).await;

        run_transfer(&transport, &job, quick_opts()).await;

        assert!(transport.uploads().is_empty());
        assert!(job.local_path.exists());
    }

    #[tokio::test]
    async fn blocked_relocation_keeps_local_copy_after_upload() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let job = job_in(dir.path()).await;
        // occupy the processed path with a non-empty directory so both the
        // rename and the copy fallback fail
        tokio::fs::create_dir_all(job.processed_path.join("blocker"))
            .await
            .unwrap();

        run_transfer(&transport, &job, quick_opts()).await;

        // uploaded exactly once, local copy retained for the next cycle
        assert_eq!(transport.uploads().len(), 1);
        assert!(job.local_path.exists());
    }

    #[tokio::test]
    async fn stalled_put_is_cut_off_by_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.set_put_delay(Duration::from_secs(30));
        let job = job_in(dir.path()).await;

        let opts = TransferOptions {
            error_backoff: Duration::from_millis(5),
            transfer_timeout: Some(Duration::from_millis(50)),
        };
        run_transfer(&transport, &job, opts).await;

        assert!(transport.uploads().is_empty());
        assert!(job.local_path.exists());
    }
}

//! Retention purge over the processed store.
//!
//! Deletes the oldest processed partitions beyond the retention count.
//! The sweep is best-effort and idempotent: individual deletion failures
//! are logged and skipped, and a rerun with unchanged inputs only
//! re-attempts what previously failed. The processed root itself is never
//! removed.

use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::Result;
use crate::partition;

/// Purge processed partitions past the retention window.
///
/// Keeps the `retain_count` most recent partitions (by sorted date) and
/// deletes the rest, oldest first. `retain_count == 0` retains nothing:
/// every partition is deleted. With `dry_run` set, deletions are logged
/// and skipped. Returns the number of partitions swept.
pub async fn purge_expired(
    processed_root: &Path,
    retain_count: usize,
    dry_run: bool,
) -> Result<usize> {
    let partitions = partition::scan_partitions(processed_root).await?;

    // retain_count zero selects everything; the boundary is covered by an
    // explicit test rather than trusting the arithmetic
    let expired = partitions.len().saturating_sub(retain_count);
    if expired == 0 {
        debug!(
            partitions = partitions.len(),
            retain_count, "nothing to purge"
        );
        return Ok(0);
    }

    for partition in &partitions[..expired] {
        info!(dir = %partition.path.display(), dry_run, "purging expired partition");
        delete_tree(partition.path.clone(), dry_run).await;
    }
    Ok(expired)
}

/// Recursively delete a directory, bottom-up, continuing past individual
/// failures. In dry-run mode every deletion is logged and skipped.
fn delete_tree(dir: PathBuf, dry_run: bool) -> BoxFuture<'static, ()> {
    async move {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list directory for purge");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "purge listing interrupted");
                    break;
                }
            };
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);

            if is_dir {
                delete_tree(path, dry_run).await;
            } else if dry_run {
                info!(file = %path.display(), "dry run, would delete");
            } else if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(file = %path.display(), error = %e, "cannot delete file");
            } else {
                debug!(file = %path.display(), "deleted");
            }
        }

        if !dry_run {
            if let Err(e) = tokio::fs::remove_dir(&dir).await {
                // expected when a child deletion failed above; retried next sweep
                debug!(dir = %dir.display(), error = %e, "directory not removed");
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil;

    async fn seed_processed(root: &Path, labels: &[&str]) {
        for label in labels {
            let dir = root.join(label);
            fsutil::ensure_dir_all(&dir.join("sub")).await.unwrap();
            tokio::fs::write(dir.join("a.jpg"), b"x").await.unwrap();
            tokio::fs::write(dir.join("sub").join("b.jpg"), b"y")
                .await
                .unwrap();
        }
    }

    async fn labels_left(root: &Path) -> Vec<String> {
        partition::scan_partitions(root)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.label)
            .collect()
    }

    #[tokio::test]
    async fn keeps_the_most_recent_partitions() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(
            root.path(),
            &["2024-04-28", "2024-04-29", "2024-04-30", "2024-05-01"],
        )
        .await;

        let purged = purge_expired(root.path(), 2, false).await.unwrap();

        assert_eq!(purged, 2);
        assert_eq!(labels_left(root.path()).await, vec!["2024-04-30", "2024-05-01"]);
        assert!(root.path().exists());
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(root.path(), &["2024-04-28", "2024-04-29", "2024-04-30"]).await;

        assert_eq!(purge_expired(root.path(), 1, false).await.unwrap(), 2);
        assert_eq!(purge_expired(root.path(), 1, false).await.unwrap(), 0);
        assert_eq!(labels_left(root.path()).await, vec!["2024-04-30"]);
    }

    #[tokio::test]
    async fn retention_larger_than_population_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(root.path(), &["2024-04-30", "2024-05-01"]).await;

        assert_eq!(purge_expired(root.path(), 5, false).await.unwrap(), 0);
        assert_eq!(labels_left(root.path()).await.len(), 2);
    }

    #[tokio::test]
    async fn zero_retention_deletes_every_partition() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(root.path(), &["2024-04-30", "2024-05-01"]).await;

        assert_eq!(purge_expired(root.path(), 0, false).await.unwrap(), 2);
        assert!(labels_left(root.path()).await.is_empty());
        assert!(root.path().exists());
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(root.path(), &["2024-04-29", "2024-04-30", "2024-05-01"]).await;

        assert_eq!(purge_expired(root.path(), 1, true).await.unwrap(), 2);
        assert_eq!(labels_left(root.path()).await.len(), 3);
        assert!(root.path().join("2024-04-29/sub/b.jpg").exists());
    }

    #[tokio::test]
    async fn non_partition_entries_are_untouched() {
        let root = tempfile::tempdir().unwrap();
        seed_processed(root.path(), &["2024-04-29", "2024-04-30"]).await;
        fsutil::ensure_dir_all(&root.path().join("scratch"))
            .await
            .unwrap();

        purge_expired(root.path(), 1, false).await.unwrap();

        assert!(root.path().join("scratch").exists());
        assert!(!root.path().join("2024-04-29").exists());
    }
}

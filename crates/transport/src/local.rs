//! Local-directory transport adapter.
//!
//! Mirrors uploads into a directory on a locally reachable filesystem
//! (typically a mounted network share). The simplest real backend, and the
//! one integration tests run against for end-to-end coverage with real I/O.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::{Transport, TransportConnection, TransportError, TransportResult};

/// Transport that stores files under a local destination root.
pub struct LocalDirTransport {
    root: PathBuf,
    connect_timeout: Duration,
}

impl LocalDirTransport {
    pub fn new(root: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            connect_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Transport for LocalDirTransport {
    async fn connect(&self) -> TransportResult<Box<dyn TransportConnection>> {
        // A missing root is the local analogue of an unreachable server:
        // the mount may be down, so fail the connect instead of creating it.
        let probe = tokio::time::timeout(self.connect_timeout, fs::metadata(&self.root)).await;
        match probe {
            Ok(Ok(meta)) if meta.is_dir() => {}
            Ok(Ok(_)) => {
                return Err(TransportError::Connect(std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    format!("destination root {} is not a directory", self.root.display()),
                )));
            }
            Ok(Err(e)) => return Err(TransportError::Connect(e)),
            Err(_) => {
                return Err(TransportError::Connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )));
            }
        }

        debug!(root = %self.root.display(), "local transport session opened");
        Ok(Box::new(LocalDirConnection {
            root: self.root.clone(),
            cwd: self.root.clone(),
        }))
    }
}

struct LocalDirConnection {
    root: PathBuf,
    cwd: PathBuf,
}

#[async_trait]
impl TransportConnection for LocalDirConnection {
    async fn change_or_create_dir(&mut self, path: &str) -> TransportResult<()> {
        let target = self.root.join(path);
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                fs::create_dir_all(&target)
                    .await
                    .map_err(|e| TransportError::Directory {
                        path: path.to_string(),
                        source: e,
                    })?;
            }
        }
        self.cwd = target;
        Ok(())
    }

    async fn put_file(
        &mut self,
        local: &Path,
        remote_name: &str,
        _preserve_timestamp: bool,
    ) -> TransportResult<()> {
        let dest = self.cwd.join(remote_name);
        fs::copy(local, &dest)
            .await
            .map_err(|e| TransportError::Transfer {
                name: remote_name.to_string(),
                source: e,
            })?;
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn connect_fails_when_root_missing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalDirTransport::new(dir.path().join("not-mounted"), TIMEOUT);

        let err = transport.connect().await.err().unwrap();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn put_stores_under_entered_directory() {
        let remote = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let src = staging.path().join("a.jpg");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let transport = LocalDirTransport::new(remote.path(), TIMEOUT);
        let mut conn = transport.connect().await.unwrap();
        conn.change_or_create_dir("2024-05-01/cam1").await.unwrap();
        conn.put_file(&src, "a.jpg", true).await.unwrap();
        conn.close().await;

        let stored = remote.path().join("2024-05-01/cam1/a.jpg");
        assert_eq!(tokio::fs::read(&stored).await.unwrap(), b"payload");
        // the source is copied, not consumed
        assert!(src.exists());
    }

    #[tokio::test]
    async fn change_dir_is_idempotent() {
        let remote = tempfile::tempdir().unwrap();
        let transport = LocalDirTransport::new(remote.path(), TIMEOUT);

        let mut conn = transport.connect().await.unwrap();
        conn.change_or_create_dir("2024-05-01").await.unwrap();
        conn.change_or_create_dir("2024-05-01").await.unwrap();
        conn.close().await;

        assert!(remote.path().join("2024-05-01").is_dir());
    }
}

//! Scriptable in-memory transport for tests.
//!
//! Records every upload and supports failure injection so scheduler tests
//! can exercise the retry paths without a real backend. Compiled into the
//! library (not behind `cfg(test)`) so downstream crates can drive their
//! integration tests with it.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Transport, TransportConnection, TransportError, TransportResult};

#[derive(Default)]
struct MockState {
    connect_attempts: AtomicUsize,
    fail_connects: AtomicUsize,
    fail_puts: Mutex<BTreeSet<String>>,
    fail_dirs: Mutex<BTreeSet<String>>,
    put_delay: Mutex<Option<Duration>>,
    uploads: Mutex<Vec<(String, String)>>,
    dirs: Mutex<BTreeSet<String>>,
}

/// In-memory [`Transport`] with failure injection.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Fail every put of `remote_name` until cleared.
    pub fn fail_puts_of(&self, remote_name: &str) {
        self.state.fail_puts.lock().insert(remote_name.to_string());
    }

    pub fn clear_put_failures(&self) {
        self.state.fail_puts.lock().clear();
    }

    /// Fail enter-or-create of the given directory path.
    pub fn fail_dir(&self, path: &str) {
        self.state.fail_dirs.lock().insert(path.to_string());
    }

    /// Delay every put, to hold workers in flight during a test.
    pub fn set_put_delay(&self, delay: Duration) {
        *self.state.put_delay.lock() = Some(delay);
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Every successful upload so far, as `(directory, remote_name)`.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.uploads.lock().clone()
    }

    /// Remote names uploaded so far, sorted.
    pub fn uploaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .uploads
            .lock()
            .iter()
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every directory entered or created so far, sorted.
    pub fn dirs(&self) -> Vec<String> {
        self.state.dirs.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> TransportResult<Box<dyn TransportConnection>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect(std::io::Error::other(
                "injected connect failure",
            )));
        }

        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            cwd: String::new(),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    cwd: String,
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn change_or_create_dir(&mut self, path: &str) -> TransportResult<()> {
        if self.state.fail_dirs.lock().contains(path) {
            return Err(TransportError::Directory {
                path: path.to_string(),
                source: std::io::Error::other("injected directory failure"),
            });
        }
        self.state.dirs.lock().insert(path.to_string());
        self.cwd = path.to_string();
        Ok(())
    }

    async fn put_file(
        &mut self,
        local: &Path,
        remote_name: &str,
        _preserve_timestamp: bool,
    ) -> TransportResult<()> {
        let delay = *self.state.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_puts.lock().contains(remote_name) {
            return Err(TransportError::Transfer {
                name: remote_name.to_string(),
                source: std::io::Error::other("injected transfer failure"),
            });
        }

        // Read the source like a real backend would; a vanished local file
        // is a transfer failure, not a silent success.
        tokio::fs::metadata(local)
            .await
            .map_err(|e| TransportError::Transfer {
                name: remote_name.to_string(),
                source: e,
            })?;

        self.state
            .uploads
            .lock()
            .push((self.cwd.clone(), remote_name.to_string()));
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_failures_are_consumed_in_order() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(transport.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn uploads_record_directory_and_name() {
        let staging = tempfile::tempdir().unwrap();
        let src = staging.path().join("c.jpg");
        tokio::fs::write(&src, b"x").await.unwrap();

        let transport = MockTransport::new();
        let mut conn = transport.connect().await.unwrap();
        conn.change_or_create_dir("2024-04-30").await.unwrap();
        conn.put_file(&src, "c.jpg", true).await.unwrap();
        conn.close().await;

        assert_eq!(
            transport.uploads(),
            vec![("2024-04-30".to_string(), "c.jpg".to_string())]
        );
        assert_eq!(transport.dirs(), vec!["2024-04-30".to_string()]);
    }

    #[tokio::test]
    async fn injected_put_failure_clears() {
        let staging = tempfile::tempdir().unwrap();
        let src = staging.path().join("a.jpg");
        tokio::fs::write(&src, b"x").await.unwrap();

        let transport = MockTransport::new();
        transport.fail_puts_of("a.jpg");

        let mut conn = transport.connect().await.unwrap();
        conn.change_or_create_dir("d").await.unwrap();
        assert!(conn.put_file(&src, "a.jpg", true).await.is_err());

        transport.clear_put_failures();
        assert!(conn.put_file(&src, "a.jpg", true).await.is_ok());
        conn.close().await;
    }
}

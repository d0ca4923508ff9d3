//! Remote storage transport abstraction.
//!
//! The upload core talks to remote storage exclusively through the
//! [`Transport`] and [`TransportConnection`] traits, so the scheduling
//! logic is identical regardless of which concrete backend is configured.
//! This crate ships a local-directory adapter ([`local::LocalDirTransport`])
//! and a scriptable mock for tests ([`mock::MockTransport`]).

pub mod local;
pub mod mock;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failures surfaced by a transport backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("remote directory '{path}' unavailable: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer of '{name}' failed: {source}")]
    Transfer {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// A transfer that exceeded its allotted time.
    pub fn timed_out(name: impl Into<String>) -> Self {
        Self::Transfer {
            name: name.into(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "transfer timed out"),
        }
    }
}

/// A configured remote storage endpoint.
///
/// `connect` is expected to bound the attempt with the backend's configured
/// connect timeout and to land the session in the destination root, so that
/// directory paths handed to the connection are relative to it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> TransportResult<Box<dyn TransportConnection>>;
}

/// One live session against remote storage.
#[async_trait]
pub trait TransportConnection: Send {
    /// Enter `path`, creating it first if it does not exist yet.
    ///
    /// Subsequent [`put_file`](Self::put_file) calls store into the entered
    /// directory.
    async fn change_or_create_dir(&mut self, path: &str) -> TransportResult<()>;

    /// Store the bytes of `local` under `remote_name` in the current
    /// directory. `preserve_timestamp` is a hint; backends without
    /// timestamp support ignore it.
    async fn put_file(
        &mut self,
        local: &Path,
        remote_name: &str,
        preserve_timestamp: bool,
    ) -> TransportResult<()>;

    /// Release the session. Close failures are the backend's to swallow;
    /// callers close on every exit path and cannot act on them.
    async fn close(self: Box<Self>);
}

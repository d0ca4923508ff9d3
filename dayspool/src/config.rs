//! Daemon configuration.
//!
//! Loaded from a TOML file; every tunable has a serde default so a minimal
//! config only names the three roots.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

fn default_max_workers() -> usize {
    4
}

fn default_reserved_priority_workers() -> usize {
    1
}

fn default_retain_days() -> usize {
    7
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_error_backoff_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_transfer_timeout_secs() -> u64 {
    3600
}

/// Configuration for the upload and retention daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    /// Root the capture process writes day partitions into.
    pub incoming_root: PathBuf,
    /// Local mirror of uploaded files, pending purge.
    pub processed_root: PathBuf,
    /// Destination root on the remote side.
    pub remote_root: PathBuf,

    /// Hard cap on concurrently active transfer workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Worker slots reserved for today's partition.
    #[serde(default = "default_reserved_priority_workers")]
    pub reserved_priority_workers: usize,
    /// Most-recent processed partitions preserved from purge.
    /// Zero retains nothing: every processed partition is eligible.
    #[serde(default = "default_retain_days")]
    pub retain_days: usize,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on a single file transfer. Zero disables the bound.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    /// Log deletions without removing anything.
    #[serde(default)]
    pub dry_run_delete: bool,

    /// Directory for daily-rotated log files. Console-only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl SpoolConfig {
    /// Create a config with default tunables for the given roots.
    pub fn new(
        incoming_root: impl Into<PathBuf>,
        processed_root: impl Into<PathBuf>,
        remote_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            incoming_root: incoming_root.into(),
            processed_root: processed_root.into(),
            remote_root: remote_root.into(),
            max_workers: default_max_workers(),
            reserved_priority_workers: default_reserved_priority_workers(),
            retain_days: default_retain_days(),
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            dry_run_delete: false,
            log_dir: None,
        }
    }

    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config file", path, e))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be at least 1"));
        }
        if self.reserved_priority_workers > self.max_workers {
            return Err(Error::config(format!(
                "reserved_priority_workers ({}) exceeds max_workers ({})",
                self.reserved_priority_workers, self.max_workers
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be at least 1"));
        }
        for (name, root) in [
            ("incoming_root", &self.incoming_root),
            ("processed_root", &self.processed_root),
            ("remote_root", &self.remote_root),
        ] {
            if root.as_os_str().is_empty() {
                return Err(Error::config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-transfer bound; `None` when disabled.
    pub fn transfer_timeout(&self) -> Option<Duration> {
        (self.transfer_timeout_secs > 0).then(|| Duration::from_secs(self.transfer_timeout_secs))
    }

    // Builder-style setters, mainly for tests.

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn with_reserved_priority_workers(mut self, n: usize) -> Self {
        self.reserved_priority_workers = n;
        self
    }

    pub fn with_retain_days(mut self, n: usize) -> Self {
        self.retain_days = n;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_error_backoff_secs(mut self, secs: u64) -> Self {
        self.error_backoff_secs = secs;
        self
    }

    pub fn with_dry_run_delete(mut self, dry_run: bool) -> Self {
        self.dry_run_delete = dry_run;
        self
    }
}

//! dayspool — continuous mirror of date-partitioned capture directories.
//!
//! On every poll cycle the daemon indexes the incoming root for day
//! partitions, uploads their files through a configured transport, moves
//! uploaded files into a local processed store, and purges processed
//! partitions that aged past the retention window.

pub mod budget;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fsutil;
pub mod logging;
pub mod partition;
pub mod purge;
pub mod transfer;
pub mod uploader;

pub use error::{Error, Result};

/// Crate version, logged at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

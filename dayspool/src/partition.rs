//! Day partition index.
//!
//! A partition is a directory whose name ends in a `YYYY-MM-DD` token.
//! The index is recomputed from the filesystem on every call and holds no
//! cache, so callers must tolerate entries disappearing between the scan
//! and their use (the purger may delete them concurrently).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;

use crate::{Error, Result};

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("valid pattern"));

/// One calendar day's worth of captured files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPartition {
    pub path: PathBuf,
    pub label: String,
    pub date: NaiveDate,
}

impl DayPartition {
    pub fn is_today(&self) -> bool {
        self.date == Local::now().date_naive()
    }
}

/// Extract the trailing date token from a directory name.
///
/// The token must close the name (`2024-05-01`, `cam1-2024-05-01`) and name
/// a real calendar date; `2024-13-01` is not a partition.
pub fn parse_partition_date(name: &str) -> Option<NaiveDate> {
    let caps = DATE_TOKEN.captures(name)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Index the day partitions directly under `root`, sorted ascending by
/// label. Lexical order coincides with chronological order for the
/// zero-padded date names. Non-directories and unparseable names are
/// skipped, not errors.
pub async fn scan_partitions(root: &Path) -> Result<Vec<DayPartition>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| Error::io_path("scanning partition root", root, e))?;

    let mut partitions = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(Error::io_path("scanning partition root", root, e)),
        };

        // entries can vanish mid-scan; treat a failed stat as "not a partition"
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(date) = parse_partition_date(name) else {
            continue;
        };

        partitions.push(DayPartition {
            path: entry.path(),
            label: name.to_string(),
            date,
        });
    }

    partitions.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(partitions)
}

use crate::batch::Batch;
use crate::line_protocol::encode_batch;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const SPOOL_EXTENSION: &str = "influx";
const HOUR_BUCKET_FORMAT: &str = "%Y%m%d%H";

/// Appends undeliverable batches to one line-protocol file per hour.
///
/// Files are never truncated or rotated away; draining them is left to
/// whoever imports them into the database.
#[derive(Debug, Clone)]
pub struct SpoolWriter {
    dir: PathBuf,
}

impl SpoolWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends `batch` to the file for the current local hour.
    pub fn spool(&self, batch: &Batch) -> Result<Option<PathBuf>> {
        self.spool_at(batch, &Local::now())
    }

    /// Appends `batch` to the file for the hour containing `now`.
    ///
    /// Returns `None` without touching the disk when the batch has no points.
    pub fn spool_at<Tz>(&self, batch: &Batch, now: &DateTime<Tz>) -> Result<Option<PathBuf>>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        if batch.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = spool_path(&self.dir, now);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&path)
            .with_context(|| format!("open spool file {}", path.display()))?;

        // A single write keeps one batch contiguous within the file.
        file.write_all(encode_batch(batch).as_bytes())
            .with_context(|| format!("write spool file {}", path.display()))?;
        file.sync_data().ok();

        Ok(Some(path))
    }
}

/// `<dir>/<YYYYMMDDHH>.influx` for the hour containing `now`.
pub fn spool_path<Tz>(dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    dir.join(format!(
        "{}.{}",
        now.format(HOUR_BUCKET_FORMAT),
        SPOOL_EXTENSION
    ))
}

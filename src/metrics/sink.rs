//! Structured scalar logging

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One logged scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: u64,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
}

impl ScalarRecord {
    pub fn now(tag: &str, value: f64, step: u64) -> Self {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            tag: tag.to_string(),
            value,
            step,
            wall_time,
        }
    }
}

/// Destination for `(tag, value, step)` scalar writes
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    /// Directory the sink writes into, if any
    fn log_dir(&self) -> Option<&Path> {
        None
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per scalar to `{log_dir}/scalars.jsonl`
#[derive(Debug)]
pub struct JsonlScalarWriter {
    log_dir: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlScalarWriter {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(Self::FILE_NAME))?;
        Ok(Self {
            log_dir,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.log_dir.join(Self::FILE_NAME)
    }
}

impl ScalarSink for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let record = ScalarRecord::now(tag, value, step);
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn log_dir(&self) -> Option<&Path> {
        Some(&self.log_dir)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlScalarWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "failed to flush scalar log");
        }
    }
}

/// Keeps every scalar in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<ScalarRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ScalarRecord] {
        &self.records
    }

    /// `(step, value)` pairs logged under `tag`, in write order
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.records.push(ScalarRecord::now(tag, value, step));
        Ok(())
    }
}

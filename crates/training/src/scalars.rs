//! Scalar metric sinks. The training loop receives one explicitly; nothing is
//! global.

use anyhow::Context;
use patch_dataset::now_ms;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SCALARS_FILE: &str = "scalars.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: usize,
    pub value: f32,
    pub wall_time_ms: u64,
}

pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()>;

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to `<log_dir>/scalars.jsonl`.
pub struct JsonlScalarWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlScalarWriter {
    pub fn create(log_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log dir {}", log_dir.display()))?;
        let path = log_dir.join(SCALARS_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
            wall_time_ms: now_ms(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }
}

impl Drop for JsonlScalarWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[derive(Debug, Default)]
pub struct MemoryScalarSink {
    pub records: Vec<ScalarRecord>,
}

impl MemoryScalarSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self, tag: &str) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.step)
            .collect()
    }
}

impl ScalarSink for MemoryScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()> {
        self.records.push(ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
            wall_time_ms: now_ms(),
        });
        Ok(())
    }
}

pub fn read_scalars(path: &Path) -> anyhow::Result<Vec<ScalarRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_writer_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = JsonlScalarWriter::create(dir.path()).unwrap();
            sink.add_scalar("loss", 0.5, 10).unwrap();
            sink.add_scalar("loss", 0.25, 20).unwrap();
        }
        let mut sink = JsonlScalarWriter::create(dir.path()).unwrap();
        sink.add_scalar("loss", 0.125, 30).unwrap();
        sink.flush().unwrap();

        let records = read_scalars(&dir.path().join(SCALARS_FILE)).unwrap();
        let steps: Vec<usize> = records.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![10, 20, 30]);
        assert_eq!(records[1].value, 0.25);
        assert!(records.iter().all(|r| r.tag == "loss"));
    }

    #[test]
    fn memory_sink_filters_by_tag() {
        let mut sink = MemoryScalarSink::new();
        sink.add_scalar("loss", 1.0, 1).unwrap();
        sink.add_scalar("lr", 0.1, 1).unwrap();
        sink.add_scalar("loss", 0.5, 2).unwrap();
        assert_eq!(sink.steps("loss"), vec![1, 2]);
    }
}

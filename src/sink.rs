//! Output sinks for job records and run statistics.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{JobRecord, RunStats};

/// Append-only destination for a run's output.
///
/// Write failures are fatal to the run.
#[async_trait]
pub trait RecordSink: Send {
    async fn push_record(&mut self, record: &JobRecord) -> Result<()>;

    async fn write_stats(&mut self, stats: &RunStats) -> Result<()>;
}

/// JSON Lines dataset file plus a separate pretty-printed stats file.
pub struct JsonLinesSink {
    dataset: File,
    dataset_path: PathBuf,
    stats_path: PathBuf,
}

impl JsonLinesSink {
    /// Open `dataset_path` for appending, creating it if needed.
    pub async fn open(dataset_path: impl AsRef<Path>, stats_path: impl AsRef<Path>) -> Result<Self> {
        let dataset_path = dataset_path.as_ref().to_path_buf();
        if let Some(parent) = dataset_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dataset = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&dataset_path)
            .await?;

        Ok(Self {
            dataset,
            dataset_path,
            stats_path: stats_path.as_ref().to_path_buf(),
        })
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn push_record(&mut self, record: &JobRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.dataset.write_all(&line).await?;
        self.dataset.flush().await?;
        debug!("Saved {}", record.url);
        Ok(())
    }

    async fn write_stats(&mut self, stats: &RunStats) -> Result<()> {
        self.dataset.sync_all().await?;
        let json = serde_json::to_string_pretty(stats)?;
        tokio::fs::write(&self.stats_path, json).await?;
        info!("Wrote run statistics to {}", self.stats_path.display());
        Ok(())
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<JobRecord>,
    pub stats: Option<RunStats>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.url.as_str()).collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn push_record(&mut self, record: &JobRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    async fn write_stats(&mut self, stats: &RunStats) -> Result<()> {
        self.stats = Some(stats.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: u32) -> JobRecord {
        JobRecord::new(format!("Chef {}", n), format!("https://www.caterer.com/job/{}", n))
    }

    #[tokio::test]
    async fn test_json_lines_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("out/dataset.jsonl");
        let stats_path = dir.path().join("stats.json");

        let mut sink = JsonLinesSink::open(&dataset, &stats_path).await.unwrap();
        sink.push_record(&record(1)).await.unwrap();
        sink.push_record(&record(2)).await.unwrap();

        let mut stats = RunStats::default();
        stats.records_saved = 2;
        sink.write_stats(&stats).await.unwrap();

        let content = std::fs::read_to_string(&dataset).unwrap();
        let lines: Vec<JobRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![record(1), record(2)]);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&stats_path).unwrap()).unwrap();
        assert_eq!(written["recordsSaved"], 2);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("dataset.jsonl");
        let stats_path = dir.path().join("stats.json");

        for n in 0..2 {
            let mut sink = JsonLinesSink::open(&dataset, &stats_path).await.unwrap();
            sink.push_record(&record(n)).await.unwrap();
        }

        let content = std::fs::read_to_string(&dataset).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.push_record(&record(7)).await.unwrap();
        sink.write_stats(&RunStats::default()).await.unwrap();
        assert_eq!(sink.urls(), vec!["https://www.caterer.com/job/7"]);
        assert!(sink.stats.is_some());
    }
}

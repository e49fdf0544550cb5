//! Event Log - Append-only JSONL Ledger Events
//!
//! Persists ledger events to daily JSONL files named
//! `events/YYYY-MM-DD.jsonl`. Each line is one self-contained,
//! internally tagged JSON record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::ports::repository::EventRecord;

/// Append-only JSONL event log with daily file rotation.
pub struct EventLog {
    events_dir: PathBuf,
}

impl EventLog {
    /// Create an event log under `data_dir/events`.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let events_dir = data_dir.as_ref().join("events");
        fs::create_dir_all(&events_dir)
            .await
            .context("Failed to create events directory")?;
        Ok(Self { events_dir })
    }

    /// Append a record to the file of the day it was recorded.
    #[instrument(skip(self, record), fields(event = record.event.name()))]
    pub async fn append(&self, record: &EventRecord) -> Result<()> {
        let day = DateTime::<Utc>::from_timestamp_millis(record.recorded_at_ms)
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d");
        let path = self.events_dir.join(format!("{day}.jsonl"));

        let mut json = serde_json::to_string(record).context("Failed to serialize event record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open event log file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write event record")?;
        file.flush().await.context("Failed to flush event log")?;
        Ok(())
    }

    /// Load every record across all daily files, oldest first.
    ///
    /// Malformed lines are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<EventRecord>> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.events_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path).await?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<EventRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(
                        file = %path.display(),
                        error = %e,
                        "Skipping malformed event record"
                    ),
                }
            }
        }

        records.sort_by_key(|r| r.recorded_at_ms);
        info!(count = records.len(), "Loaded event records");
        Ok(records)
    }

    /// Check that the events directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let marker = self.events_dir.join(".health_check");
        let result = fs::write(&marker, b"ok").await;
        let _ = fs::remove_file(&marker).await;
        result.is_ok()
    }
}

//! Repository Implementation — Concrete Adapter for the Repository Port
//!
//! Wraps `SnapshotStore` (atomic JSON snapshots) and `EventLog` (JSONL
//! append-only files) into a single struct implementing `Repository`.
//! The use cases only know the trait, never files or JSON.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use super::events::EventLog;
use super::state::SnapshotStore;
use crate::ports::repository::{EventRecord, LedgerSnapshot, Repository};

/// File-backed repository combining snapshots and the event log.
pub struct RepositoryImpl {
    snapshots: SnapshotStore,
    events: EventLog,
}

impl RepositoryImpl {
    pub fn new(snapshots: SnapshotStore, events: EventLog) -> Self {
        Self { snapshots, events }
    }

    /// Create both stores under `data_dir`.
    pub async fn from_data_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        let snapshots = SnapshotStore::new(dir).await?;
        let events = EventLog::new(dir).await?;
        Ok(Self::new(snapshots, events))
    }
}

#[async_trait]
impl Repository for RepositoryImpl {
    async fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.snapshots.save(snapshot).await
    }

    async fn load_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        self.snapshots.load().await
    }

    async fn append_event(&self, record: &EventRecord) -> Result<()> {
        self.events.append(record).await
    }

    async fn load_events(&self) -> Result<Vec<EventRecord>> {
        self.events.load_all().await
    }

    async fn is_healthy(&self) -> bool {
        self.snapshots.is_healthy().await && self.events.is_healthy().await
    }
}

//! Snapshot Store - Atomic JSON Ledger Persistence
//!
//! Saves ledger snapshots to `ledger.json` using atomic writes
//! (write to tmp file, then rename). The file is always either the
//! old or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument};

use crate::ports::repository::LedgerSnapshot;

/// Atomic JSON snapshot store for crash recovery.
pub struct SnapshotStore {
    /// Path to ledger.json.
    snapshot_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl SnapshotStore {
    /// Create a snapshot store in `data_dir`, creating it if needed.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            snapshot_path: dir.join("ledger.json"),
            tmp_path: dir.join("ledger.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize ledger snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;

        fs::rename(&self.tmp_path, &self.snapshot_path)
            .await
            .context("Failed to rename snapshot file")?;

        info!(
            path = %self.snapshot_path.display(),
            markets = snapshot.markets.len(),
            "Ledger snapshot saved"
        );
        Ok(())
    }

    /// Load the stored snapshot; `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<LedgerSnapshot>> {
        if !fs::try_exists(&self.snapshot_path).await.unwrap_or(false) {
            info!("No ledger snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.snapshot_path)
            .await
            .context("Failed to read snapshot file")?;
        let snapshot: LedgerSnapshot =
            serde_json::from_str(&json).context("Failed to parse snapshot JSON")?;

        info!(
            version = %snapshot.version,
            ledger = %snapshot.ledger_id,
            markets = snapshot.markets.len(),
            "Ledger snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// The snapshot file is readable, or absent (first run).
    pub async fn is_healthy(&self) -> bool {
        match fs::try_exists(&self.snapshot_path).await {
            Ok(true) => fs::metadata(&self.snapshot_path).await.is_ok(),
            Ok(false) => true,
            Err(_) => false,
        }
    }
}

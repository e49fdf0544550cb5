//! Repository Port - Ledger State Persistence Interface
//!
//! Defines traits for persisting ledger state and the event trail.
//! No database dependency - an atomic JSON snapshot for the aggregate
//! root plus an append-only JSONL log of events for auditing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::auth::LedgerId;
use crate::domain::events::LedgerEvent;
use crate::domain::fees::FeeSchedule;
use crate::domain::market::{AccountId, Amount, AssetKind, Bet, Market, MarketId, Timestamp};

/// One market together with all of its bets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRecord {
  pub market: Market,
  pub bets: Vec<Bet>,
}

/// Full ledger state for crash recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
  /// Version of the snapshot format.
  pub version: String,
  /// Ledger identity (caps are minted against it).
  pub ledger_id: LedgerId,
  /// Asset this ledger settles in.
  pub asset: AssetKind,
  /// Escrow holder prefix used for market holders.
  pub escrow_prefix: String,
  pub fees: FeeSchedule,
  pub fee_recipient: AccountId,
  pub protocol_fees_collected: Amount,
  pub transaction_fees_collected: Amount,
  pub paused: bool,
  pub next_market_id: MarketId,
  pub markets: Vec<MarketRecord>,
  /// When the snapshot was taken (ledger time).
  pub taken_at: Timestamp,
}

/// A persisted event with its commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
  /// Wall-clock time of recording (Unix ms).
  pub recorded_at_ms: i64,
  #[serde(flatten)]
  pub event: LedgerEvent,
}

/// Trait for ledger persistence providers.
///
/// Snapshots are replaced atomically; events are append-only, one
/// self-contained JSON object per line.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
  /// Replace the stored snapshot.
  async fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> anyhow::Result<()>;

  /// Load the most recent snapshot, if any.
  async fn load_snapshot(&self) -> anyhow::Result<Option<LedgerSnapshot>>;

  /// Append an event to the audit log.
  async fn append_event(&self, record: &EventRecord) -> anyhow::Result<()>;

  /// Load every recorded event in recording order.
  async fn load_events(&self) -> anyhow::Result<Vec<EventRecord>>;

  /// Check if the repository is healthy (disk space, permissions).
  async fn is_healthy(&self) -> bool;
}

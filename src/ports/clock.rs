//! Clock Port - Ledger Time Source
//!
//! Market cutoffs, resolution times and rebalance intervals are all
//! measured against this clock so tests can drive time explicitly.

use crate::domain::market::Timestamp;

/// Source of the current ledger time in whole seconds.
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> Timestamp;
}

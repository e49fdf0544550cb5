//! Domain layer - Core settlement logic and models.
//!
//! This module contains the pure domain logic for the settlement engine:
//! fee math, payout and yield distribution, venue scoring and the
//! rebalance rule. No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod auth;
pub mod error;
pub mod events;
pub mod fees;
pub mod market;
pub mod payout;
pub mod rebalance;
pub mod venue;

// Re-export core types for convenience
pub use auth::{AdminCap, LedgerId};
pub use error::{ErrorKind, LedgerError};
pub use events::LedgerEvent;
pub use fees::{FeeKind, FeeSchedule, FeeSplit, apply_fee};
pub use market::{
    AccountId, Amount, AssetKind, BasisPoints, Bet, BetId, Market, MarketId, MarketState, Odds,
    Position, Timestamp,
};
pub use rebalance::{RebalanceConfig, RebalanceDecision, RebalanceInstruction, RebalanceState};
pub use venue::{ProtocolId, RiskTier, SelectionPolicy, VenueMetrics};

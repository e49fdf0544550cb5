//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the engine's core workflows. Each use case owns its own lock.
//!
//! Use cases:
//! - `MarketLedger`: Market lifecycle, bets, resolution, claims, fees
//! - `ProtocolSelector`: Venue scoring and fund routing
//! - `RebalancingAgent`: Scheduled migration to the best venue
//! - `VenueRegistry`: Registered venues and allocation bookkeeping

pub mod market_ledger;
pub mod protocol_selector;
pub mod rebalancer;
pub mod venue_registry;

pub use market_ledger::{LedgerSettings, MarketLedger};
pub use protocol_selector::ProtocolSelector;
pub use rebalancer::RebalancingAgent;

//! Yield venue adapters.
//!
//! `SimulatedVenue` keeps balances in memory and accrues interest on
//! demand. It fronts every protocol in config-driven deployments and
//! in tests.

pub mod simulated;

pub use simulated::SimulatedVenue;

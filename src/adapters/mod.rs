//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `auth`: In-memory capability registry
//! - `clock`: System and manual clocks
//! - `events`: Broadcast event sink and persistent recorder
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL event log and ledger snapshots
//! - `venues`: Simulated yield venues

pub mod auth;
pub mod clock;
pub mod events;
pub mod metrics;
pub mod persistence;
pub mod venues;

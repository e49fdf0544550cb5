//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `YieldVenue`: Yield-bearing protocol deposits, withdrawals, metrics
//! - `Authorizer`: Capability credential verification
//! - `Clock`: Ledger time
//! - `EventSink`: Outbound ledger events
//! - `Repository`: State persistence (JSON snapshot + JSONL events)

pub mod authorizer;
pub mod clock;
pub mod event_sink;
pub mod repository;
pub mod venue;

//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the Repository port using append-only JSONL files
//! for the event trail and atomic JSON snapshots for ledger state.
//! No database dependency — lightweight and crash-recoverable.

pub mod events;
pub mod repository_impl;
pub mod state;

pub use events::EventLog;
pub use repository_impl::RepositoryImpl;
pub use state::SnapshotStore;

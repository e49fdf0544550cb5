//! Event Sink Port - Outbound Ledger Events
//!
//! Receives a [`LedgerEvent`] at every state commit. Emission is
//! fire-and-forget: a sink must never fail or block the ledger.

use crate::domain::events::LedgerEvent;

/// Consumer of ledger events.
pub trait EventSink: Send + Sync + 'static {
  fn emit(&self, event: LedgerEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
  fn emit(&self, _event: LedgerEvent) {}
}

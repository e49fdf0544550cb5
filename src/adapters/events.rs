//! Event Plumbing - Broadcast Sink and Recorder
//!
//! `BroadcastEventSink` fans ledger events out over a tokio broadcast
//! channel without ever blocking the ledger. `EventRecorder` consumes
//! that channel, appends every event to the repository and feeds the
//! Prometheus counters.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::domain::events::LedgerEvent;
use crate::ports::event_sink::EventSink;
use crate::ports::repository::{EventRecord, Repository};

use super::metrics::MetricsRegistry;

/// Event sink publishing on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<LedgerEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: LedgerEvent) {
        debug!(event = event.name(), "Ledger event");
        // no subscriber is not an error
        let _ = self.tx.send(event);
    }
}

/// Persists and meters every event from a broadcast channel.
pub struct EventRecorder<R: Repository> {
    repository: Arc<R>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<R: Repository> EventRecorder<R> {
    pub fn new(repository: Arc<R>, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self {
            repository,
            metrics,
        }
    }

    /// Record one event.
    pub async fn record(&self, event: LedgerEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(&event);
        }
        let record = EventRecord {
            recorded_at_ms: Utc::now().timestamp_millis(),
            event,
        };
        if let Err(e) = self.repository.append_event(&record).await {
            warn!(event = record.event.name(), error = %e, "Failed to persist event");
        }
    }

    /// Drain `rx` until shutdown or until the channel closes.
    #[instrument(skip_all, name = "event_recorder")]
    pub async fn run(
        &self,
        mut rx: broadcast::Receiver<LedgerEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        info!("Event recorder started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    // flush whatever is already queued
                    while let Ok(event) = rx.try_recv() {
                        self.record(event).await;
                    }
                    info!("Event recorder shutting down");
                    return Ok(());
                }
                event = rx.recv() => {
                    match event {
                        Ok(event) => self.record(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(dropped = n, "Event recorder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Event channel closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

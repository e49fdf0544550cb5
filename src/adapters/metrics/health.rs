//! Engine health probes.
//!
//! `/live` answers as long as the process runs. `/ready` reports
//! whether settlement traffic can be served: some venue must be
//! reachable and the repository writable. A paused ledger stays
//! ready because claims keep working. `/status` returns each flag
//! as JSON for dashboards.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Flags flipped by the background loops and read by the probes.
#[derive(Debug)]
pub struct HealthState {
    /// At least one venue answered its last metrics poll.
    pub venues_healthy: AtomicBool,
    /// Snapshot and event storage are writable.
    pub repository_healthy: AtomicBool,
    /// The ledger accepts new markets and bets.
    pub ledger_open: AtomicBool,
}

/// Point-in-time copy of [`HealthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub venues_healthy: bool,
    pub repository_healthy: bool,
    pub ledger_open: bool,
}

impl HealthState {
    /// Everything healthy until a loop says otherwise.
    pub const fn new() -> Self {
        Self {
            venues_healthy: AtomicBool::new(true),
            repository_healthy: AtomicBool::new(true),
            ledger_open: AtomicBool::new(true),
        }
    }

    /// Pause is deliberately not part of readiness.
    pub fn is_ready(&self) -> bool {
        self.venues_healthy.load(Ordering::Relaxed) && self.repository_healthy.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            ready: self.is_ready(),
            venues_healthy: self.venues_healthy.load(Ordering::Relaxed),
            repository_healthy: self.repository_healthy.load(Ordering::Relaxed),
            ledger_open: self.ledger_open.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server for the probes.
pub struct HealthServer {
    state: Arc<HealthState>,
    addr: SocketAddr,
}

impl HealthServer {
    /// Listens on all interfaces at `port`.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self {
            state,
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/live", get(|| async { (StatusCode::OK, "OK") }))
            .route("/ready", get(ready))
            .route("/status", get(status))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// # Errors
    /// Bind or accept failures.
    #[instrument(skip(self, shutdown_rx), fields(addr = %self.addr))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Health probes listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;
        Ok(())
    }
}

async fn ready(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn status(State(state): State<Arc<HealthState>>) -> Json<HealthReport> {
    Json(state.report())
}

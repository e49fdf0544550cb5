//! Yieldbet Engine — Entry Point
//!
//! Wires the settlement ledger to simulated yield venues and runs the
//! background loops around it. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Open the file repository (snapshot + JSONL events)
//! 4. Build venues, selector and ledger (restoring the last snapshot)
//! 5. Spawn event recorder, accrual, rebalance and snapshot loops
//! 6. Spawn health (/live, /ready) and metrics (/metrics) servers
//! 7. Wait for SIGINT → graceful shutdown (signal→snapshot→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use yieldbet_engine::adapters::auth::CapabilityAuthorizer;
use yieldbet_engine::adapters::clock::SystemClock;
use yieldbet_engine::adapters::events::{BroadcastEventSink, EventRecorder};
use yieldbet_engine::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use yieldbet_engine::adapters::persistence::RepositoryImpl;
use yieldbet_engine::adapters::venues::SimulatedVenue;
use yieldbet_engine::config::{self, AppConfig};
use yieldbet_engine::domain::auth::LedgerId;
use yieldbet_engine::domain::fees::FeeSchedule;
use yieldbet_engine::domain::market::AccountId;
use yieldbet_engine::domain::venue;
use yieldbet_engine::ports::repository::Repository;
use yieldbet_engine::usecases::{LedgerSettings, MarketLedger, ProtocolSelector, RebalancingAgent};

type Ledger = MarketLedger<CapabilityAuthorizer, SystemClock, BroadcastEventSink>;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.engine.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.engine.name,
        version = env!("CARGO_PKG_VERSION"),
        asset = %config.engine.asset,
        venues = config.venues.len(),
        "Starting yieldbet engine"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Persistence, metrics, health ─────────────────────
    let repository = Arc::new(
        RepositoryImpl::from_data_dir(&config.persistence.data_dir)
            .await
            .context("Failed to open data directory")?,
    );
    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new(config.engine.asset).context("Failed to register metrics")?))
    } else {
        None
    };
    let health = Arc::new(HealthState::new());

    // ── 4. Venues, selector, ledger ─────────────────────────
    let clock = Arc::new(SystemClock);
    let sink = Arc::new(BroadcastEventSink::new(4096));
    let authorizer = Arc::new(CapabilityAuthorizer::new());
    let selector = Arc::new(ProtocolSelector::new(config.engine.asset, config.selection.policy()));

    let ledger = Arc::new(build_ledger(&config, &*repository, &selector, &authorizer, &clock, &sink).await?);
    let cap = authorizer.issue(ledger.id(), AccountId::new(config.engine.admin.clone()));
    if let Some(metrics) = &metrics {
        let open = ledger
            .snapshot()
            .await
            .markets
            .iter()
            .filter(|r| !r.market.resolved)
            .count();
        metrics.set_open_markets(open);
    }

    let mut venues = Vec::with_capacity(config.venues.len());
    for v in &config.venues {
        let apy_bp = venue::percent_to_bp(v.apy_percent).context("Invalid venue APY")?;
        let adapter = Arc::new(
            SimulatedVenue::new(v.protocol, config.engine.asset, apy_bp).with_base_tvl(v.initial_tvl),
        );
        ledger
            .register_venue(&cap, adapter.clone(), v.risk_tier)
            .await
            .with_context(|| format!("Failed to register venue {}", v.protocol))?;
        venues.push(adapter);
    }
    health.ledger_open.store(!ledger.is_paused().await, Ordering::Relaxed);

    // ── 5. Background loops ─────────────────────────────────
    let recorder = EventRecorder::new(Arc::clone(&repository), metrics.clone());
    let recorder_rx = sink.subscribe();
    let recorder_shutdown = shutdown_tx.subscribe();
    let recorder_handle = tokio::spawn(async move {
        if let Err(e) = recorder.run(recorder_rx, recorder_shutdown).await {
            error!(error = %e, "Event recorder failed");
        }
    });

    let accrual_handle = tokio::spawn(run_accrual(
        venues,
        Arc::clone(&selector),
        metrics.clone(),
        Arc::clone(&health),
        config.persistence.accrual_interval_seconds,
        shutdown_tx.subscribe(),
    ));

    let agent = RebalancingAgent::new(
        Arc::clone(&selector),
        Arc::clone(&clock),
        Arc::clone(&sink),
        config.rebalance.rule(),
    );
    let rebalance_handle = tokio::spawn(run_rebalancer(
        agent,
        config.rebalance.check_interval_secs,
        shutdown_tx.subscribe(),
    ));

    let snapshot_handle = tokio::spawn(run_snapshots(
        Arc::clone(&ledger),
        Arc::clone(&repository),
        Arc::clone(&health),
        config.persistence.snapshot_interval_seconds,
        shutdown_tx.subscribe(),
    ));

    // ── 6. Health and metrics servers ───────────────────────
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = metrics.map(|m| {
        let bind = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = m.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    info!(ledger = %ledger.id(), "All tasks spawned — engine is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());
    health.repository_healthy.store(false, Ordering::Relaxed);

    let snapshot = ledger.snapshot().await;
    match repository.save_snapshot(&snapshot).await {
        Ok(()) => info!(markets = snapshot.markets.len(), "Final snapshot saved"),
        Err(e) => error!(error = %e, "Failed to save final snapshot"),
    }

    for handle in [recorder_handle, accrual_handle, rebalance_handle, snapshot_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    health_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Restore the ledger from the last snapshot, or start a fresh one.
async fn build_ledger(
    config: &AppConfig,
    repository: &RepositoryImpl,
    selector: &Arc<ProtocolSelector>,
    authorizer: &Arc<CapabilityAuthorizer>,
    clock: &Arc<SystemClock>,
    sink: &Arc<BroadcastEventSink>,
) -> Result<Ledger> {
    if let Some(snapshot) = repository.load_snapshot().await? {
        let unsettled = snapshot
            .markets
            .iter()
            .filter(|r| r.bets.iter().any(|b| !b.claimed))
            .count();
        if unsettled > 0 {
            warn!(unsettled, "Simulated venue balances are not persisted; unsettled markets start with empty escrow");
        }
        return MarketLedger::restore(
            snapshot,
            Arc::clone(selector),
            Arc::clone(authorizer),
            Arc::clone(clock),
            Arc::clone(sink),
        )
        .context("Failed to restore ledger snapshot");
    }

    let settings = LedgerSettings {
        asset: config.engine.asset,
        escrow_prefix: config.engine.escrow_prefix.clone(),
        fees: FeeSchedule::new(config.fees.protocol_fee_bp, config.fees.transaction_fee_bp)?,
        fee_recipient: AccountId::new(config.fees.fee_recipient.clone()),
    };
    MarketLedger::new(
        LedgerId::new(),
        settings,
        Arc::clone(selector),
        Arc::clone(authorizer),
        Arc::clone(clock),
        Arc::clone(sink),
    )
    .context("Failed to create ledger")
}

/// Accrue simulated yield and refresh venue gauges on a fixed period.
async fn run_accrual(
    venues: Vec<Arc<SimulatedVenue>>,
    selector: Arc<ProtocolSelector>,
    metrics: Option<Arc<MetricsRegistry>>,
    health: Arc<HealthState>,
    interval_secs: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Accrual loop stopped");
                return;
            }
            _ = ticker.tick() => {
                for v in &venues {
                    v.accrue(interval_secs).await;
                }
                let live = selector.venue_metrics().await;
                health.venues_healthy.store(!live.is_empty(), Ordering::Relaxed);
                if let Some(m) = &metrics {
                    m.set_venue_metrics(&live);
                }
            }
        }
    }
}

/// Drive the rebalancing agent on a fixed period.
async fn run_rebalancer(
    agent: RebalancingAgent<SystemClock, BroadcastEventSink>,
    interval_secs: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Rebalance loop stopped");
                return;
            }
            _ = ticker.tick() => {
                match agent.run_once().await {
                    Ok(report) => info!(
                        evaluated = report.evaluated(),
                        executed = report.executed.len(),
                        failed = report.failed.len(),
                        "Rebalance round complete"
                    ),
                    Err(e) => warn!(error = %e, "Rebalance round failed"),
                }
            }
        }
    }
}

/// Persist ledger snapshots on a fixed period.
async fn run_snapshots(
    ledger: Arc<Ledger>,
    repository: Arc<RepositoryImpl>,
    health: Arc<HealthState>,
    interval_secs: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            _ = ticker.tick() => {
                let snapshot = ledger.snapshot().await;
                if let Err(e) = repository.save_snapshot(&snapshot).await {
                    error!(error = %e, "Periodic snapshot failed");
                }
                health.repository_healthy.store(repository.is_healthy().await, Ordering::Relaxed);
                health.ledger_open.store(!ledger.is_paused().await, Ordering::Relaxed);
            }
        }
    }
}

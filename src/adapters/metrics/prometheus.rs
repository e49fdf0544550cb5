//! Prometheus Metrics Registry - Settlement Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Counters are driven by ledger events; venue gauges are refreshed
//! from live selector metrics.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::events::LedgerEvent;
use crate::domain::market::AssetKind;
use crate::domain::venue::VenueMetrics;

/// Centralized Prometheus metrics for the settlement engine.
///
/// All metrics are named `yieldbet_*` and carry an `asset` label so
/// several ledgers can share one dashboard.
pub struct MetricsRegistry {
    registry: Registry,
    asset: String,
    /// Ledger events by type.
    pub events: IntCounterVec,
    /// Bets by side.
    pub bets_placed: IntCounterVec,
    /// Gross stake accepted, in base units.
    pub staked_amount: IntCounterVec,
    /// Payouts released by claims, in base units.
    pub claims_paid: IntCounterVec,
    /// Bettor yield per resolved market.
    pub market_yield: HistogramVec,
    /// Executed rebalances by route.
    pub rebalances: IntCounterVec,
    /// Fees paid out to the recipient, by kind.
    pub fees_swept: IntCounterVec,
    /// Live venue APY in basis points.
    pub venue_apy_bp: GaugeVec,
    /// Live venue TVL in base units.
    pub venue_tvl: GaugeVec,
    /// Markets created and not yet resolved.
    pub open_markets: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new(asset: AssetKind) -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            Opts::new("yieldbet_events_total", "Ledger events emitted"),
            &["asset", "event"],
        )?;
        let bets_placed = IntCounterVec::new(
            Opts::new("yieldbet_bets_placed_total", "Bets placed"),
            &["asset", "position"],
        )?;
        let staked_amount = IntCounterVec::new(
            Opts::new("yieldbet_staked_amount_total", "Gross stake accepted"),
            &["asset"],
        )?;
        let claims_paid = IntCounterVec::new(
            Opts::new("yieldbet_claims_paid_total", "Amount paid out by claims"),
            &["asset", "component"],
        )?;
        let market_yield = HistogramVec::new(
            HistogramOpts::new(
                "yieldbet_market_yield",
                "Yield left for bettors per resolved market",
            )
            .buckets(vec![0.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]),
            &["asset"],
        )?;
        let rebalances = IntCounterVec::new(
            Opts::new("yieldbet_rebalances_total", "Executed venue rebalances"),
            &["asset", "from", "to"],
        )?;
        let fees_swept = IntCounterVec::new(
            Opts::new("yieldbet_fees_swept_total", "Fees paid to the fee recipient"),
            &["asset", "kind"],
        )?;
        let venue_apy_bp = GaugeVec::new(
            Opts::new("yieldbet_venue_apy_bp", "Live venue APY in basis points"),
            &["asset", "protocol"],
        )?;
        let venue_tvl = GaugeVec::new(
            Opts::new("yieldbet_venue_tvl", "Live venue total value locked"),
            &["asset", "protocol"],
        )?;
        let open_markets = IntGauge::new("yieldbet_open_markets", "Markets created and not yet resolved")?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(bets_placed.clone()))?;
        registry.register(Box::new(staked_amount.clone()))?;
        registry.register(Box::new(claims_paid.clone()))?;
        registry.register(Box::new(market_yield.clone()))?;
        registry.register(Box::new(rebalances.clone()))?;
        registry.register(Box::new(fees_swept.clone()))?;
        registry.register(Box::new(venue_apy_bp.clone()))?;
        registry.register(Box::new(venue_tvl.clone()))?;
        registry.register(Box::new(open_markets.clone()))?;

        Ok(Self {
            registry,
            asset: asset.to_string(),
            events,
            bets_placed,
            staked_amount,
            claims_paid,
            market_yield,
            rebalances,
            fees_swept,
            venue_apy_bp,
            venue_tvl,
            open_markets,
        })
    }

    /// Update counters from one ledger event.
    pub fn observe(&self, event: &LedgerEvent) {
        let asset = self.asset.as_str();
        self.events.with_label_values(&[asset, event.name()]).inc();
        match event {
            LedgerEvent::MarketCreated { .. } => self.open_markets.inc(),
            LedgerEvent::BetPlaced { position, amount, .. } => {
                self.bets_placed
                    .with_label_values(&[asset, &position.to_string()])
                    .inc();
                self.staked_amount.with_label_values(&[asset]).inc_by(*amount);
            }
            LedgerEvent::YieldDeposited { .. } => {}
            LedgerEvent::MarketResolved { total_yield_earned, .. } => {
                self.open_markets.dec();
                #[allow(clippy::cast_precision_loss)]
                let total_yield = *total_yield_earned as f64;
                self.market_yield.with_label_values(&[asset]).observe(total_yield);
            }
            LedgerEvent::WinningsClaimed {
                winning_amount,
                yield_share,
                ..
            } => {
                self.claims_paid
                    .with_label_values(&[asset, "total"])
                    .inc_by(*winning_amount);
                self.claims_paid
                    .with_label_values(&[asset, "yield"])
                    .inc_by(*yield_share);
            }
            LedgerEvent::Rebalanced { from, to, .. } => {
                self.rebalances
                    .with_label_values(&[asset, &from.to_string(), &to.to_string()])
                    .inc();
            }
            LedgerEvent::FeesSwept {
                protocol_fees,
                transaction_fees,
                ..
            } => {
                self.fees_swept
                    .with_label_values(&[asset, "protocol"])
                    .inc_by(*protocol_fees);
                self.fees_swept
                    .with_label_values(&[asset, "transaction"])
                    .inc_by(*transaction_fees);
            }
        }
    }

    /// Seed the open-market gauge from restored state. Later
    /// creations and resolutions move it through `observe`.
    pub fn set_open_markets(&self, count: usize) {
        self.open_markets.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Refresh venue gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_venue_metrics(&self, metrics: &[VenueMetrics]) {
        for m in metrics {
            let protocol = m.protocol.to_string();
            let labels = [self.asset.as_str(), protocol.as_str()];
            self.venue_apy_bp.with_label_values(&labels).set(m.apy_bp as f64);
            self.venue_tvl.with_label_values(&labels).set(m.tvl as f64);
        }
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

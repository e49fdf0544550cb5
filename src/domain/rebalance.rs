//! Rebalance decision rule.
//!
//! Decides whether escrowed funds should move from the venue currently
//! holding them to the best-scoring venue. Pure: the caller supplies the
//! current time and live APYs, and records a rebalance only after it has
//! actually been executed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::market::{AccountId, Amount, BasisPoints, Timestamp};
use super::venue::ProtocolId;

/// Thresholds gating a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    pub enabled: bool,
    /// APY gap the best venue must clear over the current one.
    pub threshold_bp: BasisPoints,
    /// Balances below this are not worth moving.
    pub min_rebalance_amount: Amount,
    /// Seconds that must pass between two rebalances of the same holder.
    pub min_interval: Timestamp,
}

impl Default for RebalanceConfig {
    /// 0.5% gap, 1000 units, once per hour.
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bp: 50,
            min_rebalance_amount: 1_000,
            min_interval: 3_600,
        }
    }
}

/// Where a holder's funds sit now versus where they could sit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceCandidate {
    pub holder: AccountId,
    pub current: ProtocolId,
    pub current_apy_bp: BasisPoints,
    pub best: ProtocolId,
    pub best_apy_bp: BasisPoints,
    /// Balance held at the current venue.
    pub amount: Amount,
}

/// Move `amount` of `holder`'s funds from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceInstruction {
    pub holder: AccountId,
    pub from: ProtocolId,
    pub to: ProtocolId,
    pub amount: Amount,
    pub gap_bp: BasisPoints,
}

/// Why a candidate was not rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    AlreadyInBestVenue,
    GapBelowThreshold { gap_bp: BasisPoints, threshold_bp: BasisPoints },
    IntervalNotElapsed { elapsed: Timestamp, min_interval: Timestamp },
    AmountBelowMinimum { amount: Amount, min_amount: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceDecision {
    Rebalance(RebalanceInstruction),
    Skip(SkipReason),
}

/// Config plus the counters it gates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceState {
    pub config: RebalanceConfig,
    /// Monotonically increasing.
    pub rebalance_count: u64,
    /// Most recent rebalance of any holder.
    pub last_rebalance_at: Option<Timestamp>,
    /// Most recent rebalance per holder; gates `min_interval`.
    pub last_by_holder: BTreeMap<AccountId, Timestamp>,
}

impl RebalanceState {
    pub const fn new(config: RebalanceConfig) -> Self {
        Self {
            config,
            rebalance_count: 0,
            last_rebalance_at: None,
            last_by_holder: BTreeMap::new(),
        }
    }

    /// Evaluates one candidate at `now`.
    pub fn evaluate(&self, candidate: &RebalanceCandidate, now: Timestamp) -> RebalanceDecision {
        let config = &self.config;
        if !config.enabled {
            return RebalanceDecision::Skip(SkipReason::Disabled);
        }
        if candidate.current == candidate.best {
            return RebalanceDecision::Skip(SkipReason::AlreadyInBestVenue);
        }

        let gap_bp = candidate.best_apy_bp.saturating_sub(candidate.current_apy_bp);
        if gap_bp < config.threshold_bp {
            return RebalanceDecision::Skip(SkipReason::GapBelowThreshold {
                gap_bp,
                threshold_bp: config.threshold_bp,
            });
        }

        if let Some(&last) = self.last_by_holder.get(&candidate.holder) {
            let elapsed = now.saturating_sub(last);
            if elapsed < config.min_interval {
                return RebalanceDecision::Skip(SkipReason::IntervalNotElapsed {
                    elapsed,
                    min_interval: config.min_interval,
                });
            }
        }

        if candidate.amount < config.min_rebalance_amount || candidate.amount == 0 {
            return RebalanceDecision::Skip(SkipReason::AmountBelowMinimum {
                amount: candidate.amount,
                min_amount: config.min_rebalance_amount,
            });
        }

        RebalanceDecision::Rebalance(RebalanceInstruction {
            holder: candidate.holder.clone(),
            from: candidate.current,
            to: candidate.best,
            amount: candidate.amount,
            gap_bp,
        })
    }

    /// Records an executed rebalance of `holder`.
    pub fn record(&mut self, holder: &AccountId, now: Timestamp) {
        self.rebalance_count += 1;
        self.last_rebalance_at = Some(now);
        self.last_by_holder.insert(holder.clone(), now);
    }
}

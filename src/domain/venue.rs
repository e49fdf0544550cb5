//! Yield venue identity and scoring.
//!
//! Ranks venues by a fixed-weight integer score:
//!
//! `score = 60 * norm_apy + 20 * norm_tvl - 20 * norm_risk`
//!
//! where each input is normalized onto `0..=10_000`. APY and TVL are
//! normalized against the largest value among the candidates; risk tier
//! is normalized against the maximum tier (10).
//!
//! Exposes a Decimal helper for converting configured APY percentages
//! into basis points exactly.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::market::{Amount, BasisPoints};

/// Weight of normalized APY in the venue score.
pub const APY_WEIGHT: i128 = 60;
/// Weight of normalized TVL in the venue score.
pub const TVL_WEIGHT: i128 = 20;
/// Weight of normalized risk tier (subtracted).
pub const RISK_WEIGHT: i128 = 20;
/// Common scale every input is normalized onto.
pub const SCORE_SCALE: i128 = 10_000;

/// Closed set of supported yield protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolId {
    Navi,
    Scallop,
    Suilend,
    Bucket,
}

impl ProtocolId {
    pub const ALL: [Self; 4] = [Self::Navi, Self::Scallop, Self::Suilend, Self::Bucket];
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navi => write!(f, "navi"),
            Self::Scallop => write!(f, "scallop"),
            Self::Suilend => write!(f, "suilend"),
            Self::Bucket => write!(f, "bucket"),
        }
    }
}

/// Declared risk ordinal, 1 (safest) to 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskTier(u8);

impl RiskTier {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(10);

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RiskTier {
    type Error = LedgerError;

    fn try_from(tier: u8) -> Result<Self, Self::Error> {
        if (Self::MIN.0..=Self::MAX.0).contains(&tier) {
            Ok(Self(tier))
        } else {
            Err(LedgerError::InvalidRiskTier(tier))
        }
    }
}

impl From<RiskTier> for u8 {
    fn from(tier: RiskTier) -> Self {
        tier.0
    }
}

/// Live metrics for one registered venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueMetrics {
    pub protocol: ProtocolId,
    pub apy_bp: BasisPoints,
    pub tvl: Amount,
    pub risk_tier: RiskTier,
}

/// A venue together with its computed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredVenue {
    pub metrics: VenueMetrics,
    pub score: i128,
}

/// Filters applied before picking a deposit target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Venues below this APY are skipped.
    pub min_apy_bp: BasisPoints,
    /// Venues above this tier are skipped.
    pub max_risk_tier: RiskTier,
}

impl Default for SelectionPolicy {
    /// No filtering.
    fn default() -> Self {
        Self {
            min_apy_bp: 0,
            max_risk_tier: RiskTier::MAX,
        }
    }
}

fn normalize(value: u128, max: u128) -> i128 {
    if max == 0 {
        return 0;
    }
    // value <= max, so this is within 0..=SCORE_SCALE
    i128::try_from(value * SCORE_SCALE.unsigned_abs() / max).unwrap_or(SCORE_SCALE)
}

/// Scores one venue against the candidate set's maxima.
pub fn score(metrics: &VenueMetrics, max_apy_bp: BasisPoints, max_tvl: Amount) -> i128 {
    let apy = normalize(u128::from(metrics.apy_bp), u128::from(max_apy_bp));
    let tvl = normalize(u128::from(metrics.tvl), u128::from(max_tvl));
    let risk = normalize(
        u128::from(metrics.risk_tier.get()),
        u128::from(RiskTier::MAX.get()),
    );
    APY_WEIGHT * apy + TVL_WEIGHT * tvl - RISK_WEIGHT * risk
}

/// Scores every candidate and sorts best first.
///
/// Ties break on higher APY, then on protocol order, so the ranking is
/// fully deterministic.
pub fn rank(candidates: &[VenueMetrics]) -> Vec<ScoredVenue> {
    let max_apy = candidates.iter().map(|m| m.apy_bp).max().unwrap_or(0);
    let max_tvl = candidates.iter().map(|m| m.tvl).max().unwrap_or(0);

    let mut ranked: Vec<ScoredVenue> = candidates
        .iter()
        .map(|m| ScoredVenue {
            metrics: *m,
            score: score(m, max_apy, max_tvl),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.metrics.apy_bp.cmp(&a.metrics.apy_bp))
            .then(a.metrics.protocol.cmp(&b.metrics.protocol))
    });
    ranked
}

/// Picks the deposit target.
///
/// Returns the best-scoring venue that passes `policy`. When nothing
/// passes, falls back to the highest-APY venue so capital is never left
/// unrouted. `None` only when there are no candidates at all.
pub fn select_best(candidates: &[VenueMetrics], policy: &SelectionPolicy) -> Option<ScoredVenue> {
    let ranked = rank(candidates);

    if let Some(best) = ranked.iter().find(|v| {
        v.metrics.apy_bp >= policy.min_apy_bp && v.metrics.risk_tier <= policy.max_risk_tier
    }) {
        return Some(*best);
    }

    ranked.into_iter().max_by(|a, b| {
        a.metrics
            .apy_bp
            .cmp(&b.metrics.apy_bp)
            .then(b.metrics.protocol.cmp(&a.metrics.protocol))
    })
}

/// Converts an APY percentage (e.g. `5.25`) into basis points.
///
/// Sub-basis-point precision is truncated. `None` for negative input.
pub fn percent_to_bp(percent: Decimal) -> Option<BasisPoints> {
    if percent.is_sign_negative() {
        return None;
    }
    (percent * Decimal::ONE_HUNDRED).trunc().to_u64()
}

/// Renders basis points as a percentage, for logs and reports.
pub fn bp_to_percent(bp: BasisPoints) -> Decimal {
    Decimal::from(bp) / Decimal::ONE_HUNDRED
}

//! Core settlement domain types.
//!
//! Defines the ledger entities: asset kinds, accounts, markets and bets.
//! These types are the foundation of the hexagonal architecture's inner ring.
//!
//! All monetary values are integer base units (`Amount`) and every rate
//! is expressed in basis points. Nothing in here touches floating point.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Type aliases consumed by ports and adapters
// ────────────────────────────────────────────

/// Monetary amount in the asset's smallest base unit.
pub type Amount = u64;

/// Rate expressed in basis points (1/10000).
pub type BasisPoints = u64;

/// Ledger time in whole seconds.
pub type Timestamp = u64;

/// Sequential market identifier.
pub type MarketId = u64;

/// Sequential bet identifier, scoped under one market.
pub type BetId = u64;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: BasisPoints = 10_000;

// ────────────────────────────────────────────
// Enums shared across domain and ports
// ────────────────────────────────────────────

/// Fungible asset a ledger instance settles in.
///
/// Each asset kind gets its own ledger, selector and venue set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetKind {
    Usdc,
    Sui,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usdc => write!(f, "USDC"),
            Self::Sui => write!(f, "SUI"),
        }
    }
}

/// Side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Yes,
    No,
}

impl Position {
    /// The other side of the market.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Position {
    fn from(yes: bool) -> Self {
        if yes { Self::Yes } else { Self::No }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Opaque account identity (bettor, creator, fee recipient, escrow holder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Escrow holder under which one market's stakes sit inside venues.
    pub fn market_escrow(prefix: &str, asset: AssetKind, market_id: MarketId) -> Self {
        Self(format!("{prefix}:{asset}:market:{market_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a market, derived from its flags and the clock.
///
/// `Open -> Closed -> Resolved`; no transition goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    /// Active and before `end_time`: accepting bets.
    Open,
    /// Past `end_time`, awaiting resolution.
    Closed,
    /// Terminal.
    Resolved,
}

// ────────────────────────────────────────────
// Entities
// ────────────────────────────────────────────

/// A binary prediction market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub question: String,
    pub description: String,
    pub creator: AccountId,
    pub created_at: Timestamp,
    /// Bet cutoff.
    pub end_time: Timestamp,
    /// Set once resolved.
    pub resolution_time: Option<Timestamp>,
    pub total_yes_amount: Amount,
    pub total_no_amount: Amount,
    /// Yield left for bettors after the protocol fee.
    pub total_yield_earned: Amount,
    /// Protocol fee deducted from this market's yield, still held in its escrow.
    pub protocol_fee_retained: Amount,
    pub resolved: bool,
    /// Meaningful only once `resolved`.
    pub outcome: Option<Position>,
    pub active: bool,
    /// Escrow holder identity used for every venue operation of this market.
    pub escrow: AccountId,
}

impl Market {
    /// Creates a fresh open market.
    pub fn new(
        id: MarketId,
        question: String,
        description: String,
        creator: AccountId,
        created_at: Timestamp,
        end_time: Timestamp,
        escrow: AccountId,
    ) -> Self {
        Self {
            id,
            question,
            description,
            creator,
            created_at,
            end_time,
            resolution_time: None,
            total_yes_amount: 0,
            total_no_amount: 0,
            total_yield_earned: 0,
            protocol_fee_retained: 0,
            resolved: false,
            outcome: None,
            active: true,
            escrow,
        }
    }

    /// Derives the lifecycle state at `now`.
    pub const fn state(&self, now: Timestamp) -> MarketState {
        if self.resolved {
            MarketState::Resolved
        } else if now < self.end_time {
            MarketState::Open
        } else {
            MarketState::Closed
        }
    }

    /// Total staked on one side.
    pub const fn pool(&self, position: Position) -> Amount {
        match position {
            Position::Yes => self.total_yes_amount,
            Position::No => self.total_no_amount,
        }
    }

    /// Sum of both sides. Bet placement keeps this within `Amount`.
    pub const fn total_bet(&self) -> Amount {
        self.total_yes_amount.saturating_add(self.total_no_amount)
    }

    /// Current implied odds as floored percentages.
    ///
    /// `(50, 50)` while nothing is staked. The two figures need not sum
    /// to 100 because each side is floored independently.
    pub fn odds(&self) -> Odds {
        let total = u128::from(self.total_yes_amount) + u128::from(self.total_no_amount);
        if total == 0 {
            return Odds { yes_pct: 50, no_pct: 50 };
        }
        // side <= total, so the quotient is at most 100
        let pct = |side: Amount| u8::try_from(u128::from(side) * 100 / total).unwrap_or(100);
        Odds {
            yes_pct: pct(self.total_yes_amount),
            no_pct: pct(self.total_no_amount),
        }
    }
}

/// Implied market odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Odds {
    pub yes_pct: u8,
    pub no_pct: u8,
}

/// A single stake on one side of a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub market_id: MarketId,
    pub bettor: AccountId,
    pub position: Position,
    /// Gross stake before fees.
    pub amount: Amount,
    /// `amount - transaction_fee_paid`; fixed at placement.
    pub net_amount: Amount,
    pub transaction_fee_paid: Amount,
    pub placed_at: Timestamp,
    /// Monotonic latch.
    pub claimed: bool,
    /// Written once at resolution.
    pub yield_share: Amount,
}

impl Bet {
    /// Whether this bet sits on the resolved outcome.
    pub fn is_winner(&self, outcome: Position) -> bool {
        self.position == outcome
    }
}

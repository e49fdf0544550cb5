//! Ledger events emitted at the point of state commit.
//!
//! Fire-and-forget facts for indexers and notifiers. Serialized as
//! internally tagged JSON so each JSONL line is self-describing.

use serde::{Deserialize, Serialize};

use super::market::{AccountId, Amount, BetId, MarketId, Position, Timestamp};
use super::venue::ProtocolId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    MarketCreated {
        market_id: MarketId,
        question: String,
        end_time: Timestamp,
        creator: AccountId,
    },
    BetPlaced {
        bet_id: BetId,
        market_id: MarketId,
        user: AccountId,
        position: Position,
        amount: Amount,
    },
    /// Net stake routed into a venue.
    YieldDeposited {
        market_id: MarketId,
        protocol: ProtocolId,
        amount: Amount,
    },
    MarketResolved {
        market_id: MarketId,
        outcome: Position,
        total_yield_earned: Amount,
    },
    WinningsClaimed {
        market_id: MarketId,
        bet_id: BetId,
        user: AccountId,
        winning_amount: Amount,
        yield_share: Amount,
    },
    Rebalanced {
        holder: AccountId,
        from: ProtocolId,
        to: ProtocolId,
        amount: Amount,
    },
    FeesSwept {
        recipient: AccountId,
        protocol_fees: Amount,
        transaction_fees: Amount,
    },
}

impl LedgerEvent {
    /// Short label used for metrics and log fields.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MarketCreated { .. } => "market_created",
            Self::BetPlaced { .. } => "bet_placed",
            Self::YieldDeposited { .. } => "yield_deposited",
            Self::MarketResolved { .. } => "market_resolved",
            Self::WinningsClaimed { .. } => "winnings_claimed",
            Self::Rebalanced { .. } => "rebalanced",
            Self::FeesSwept { .. } => "fees_swept",
        }
    }
}

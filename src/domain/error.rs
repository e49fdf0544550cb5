//! Ledger errors.
//!
//! One enum covers every way a ledger, selector or rebalance operation can
//! be rejected. Every rejection happens before any state is committed, so
//! the caller can always retry with corrected input or a different target.

use thiserror::Error;

use super::fees::FeeKind;
use super::market::{Amount, AssetKind, BasisPoints, BetId, MarketId};
use super::venue::ProtocolId;

/// Broad category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retry with corrected values.
    Validation,
    /// The target is in the wrong state; wait or pick another target.
    State,
    /// The caller lacks rights or the ledger is suspended.
    Authorization,
    /// A venue could not provide or accept funds.
    Resource,
}

/// Errors returned by ledger, selector and rebalance operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // ── validation ────────────────────────────────────────
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("market duration must be greater than zero")]
    InvalidDuration,

    #[error("{kind} fee of {rate_bp} bp exceeds the {max_bp} bp maximum")]
    FeeTooHigh {
        kind: FeeKind,
        rate_bp: BasisPoints,
        max_bp: BasisPoints,
    },

    #[error("stake of {amount} leaves nothing after the transaction fee")]
    InsufficientAmount { amount: Amount },

    #[error("risk tier must be within 1..=10, got {0}")]
    InvalidRiskTier(u8),

    #[error("venue settles {found}, ledger settles {expected}")]
    AssetMismatch { expected: AssetKind, found: AssetKind },

    // ── state ─────────────────────────────────────────────
    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("market {0} is not active")]
    MarketNotActive(MarketId),

    #[error("market {0} has passed its betting cutoff")]
    MarketEnded(MarketId),

    #[error("market {0} has not reached its end time")]
    MarketNotEnded(MarketId),

    #[error("market {0} is already resolved")]
    MarketAlreadyResolved(MarketId),

    #[error("market {0} is not resolved yet")]
    MarketNotResolved(MarketId),

    #[error("bet {bet_id} not found in market {market_id}")]
    BetNotFound { market_id: MarketId, bet_id: BetId },

    #[error("bet {bet_id} in market {market_id} was already claimed")]
    BetAlreadyClaimed { market_id: MarketId, bet_id: BetId },

    #[error("caller does not own bet {bet_id} in market {market_id}")]
    NotBetOwner { market_id: MarketId, bet_id: BetId },

    #[error("a {0} venue is already registered")]
    VenueAlreadyRegistered(ProtocolId),

    // ── authorization ─────────────────────────────────────
    #[error("caller is not authorized to administer this ledger")]
    NotOwner,

    #[error("ledger is paused")]
    ContractPaused,

    // ── resource ──────────────────────────────────────────
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("venue deposit failed: {0}")]
    DepositFailed(String),

    #[error("no yield venue is registered")]
    NoVenueAvailable,

    #[error("venue error: {0}")]
    Venue(String),

    #[error("arithmetic overflow in ledger accounting")]
    ArithmeticOverflow,
}

impl LedgerError {
    /// Category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount
            | Self::InvalidDuration
            | Self::FeeTooHigh { .. }
            | Self::InsufficientAmount { .. }
            | Self::InvalidRiskTier(_)
            | Self::AssetMismatch { .. } => ErrorKind::Validation,
            Self::MarketNotFound(_)
            | Self::MarketNotActive(_)
            | Self::MarketEnded(_)
            | Self::MarketNotEnded(_)
            | Self::MarketAlreadyResolved(_)
            | Self::MarketNotResolved(_)
            | Self::BetNotFound { .. }
            | Self::BetAlreadyClaimed { .. }
            | Self::NotBetOwner { .. }
            | Self::VenueAlreadyRegistered(_) => ErrorKind::State,
            Self::NotOwner | Self::ContractPaused => ErrorKind::Authorization,
            Self::InsufficientBalance { .. }
            | Self::DepositFailed(_)
            | Self::NoVenueAvailable
            | Self::Venue(_)
            | Self::ArithmeticOverflow => ErrorKind::Resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(LedgerError::InvalidAmount.kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::MarketEnded(3).kind(), ErrorKind::State);
        assert_eq!(LedgerError::ContractPaused.kind(), ErrorKind::Authorization);
        assert_eq!(
            LedgerError::DepositFailed("rejected".into()).kind(),
            ErrorKind::Resource
        );
    }

    #[test]
    fn test_fee_too_high_message() {
        let err = LedgerError::FeeTooHigh {
            kind: FeeKind::Transaction,
            rate_bp: 1_500,
            max_bp: 1_000,
        };
        assert_eq!(
            err.to_string(),
            "transaction fee of 1500 bp exceeds the 1000 bp maximum"
        );
    }
}

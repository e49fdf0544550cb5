//! Basis-point fee engine.
//!
//! Converts basis-point rates into absolute amounts with floor truncation.
//! `fee + net == amount` always holds: no dust is created or lost here.
//!
//! Two rates exist: the transaction fee taken from every stake and the
//! protocol fee taken from a market's yield at resolution.

use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::market::{Amount, BasisPoints, BPS_DENOMINATOR};

/// Protocol maximum for the yield (protocol) fee: 20%.
pub const MAX_PROTOCOL_FEE_BP: BasisPoints = 2_000;

/// Protocol maximum for the transaction fee: 10%.
pub const MAX_TRANSACTION_FEE_BP: BasisPoints = 1_000;

/// Which fee a rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeKind {
    /// Deducted from market yield at resolution.
    Protocol,
    /// Deducted from each gross stake.
    Transaction,
}

impl FeeKind {
    /// Highest rate the protocol accepts for this fee.
    pub const fn max_bp(self) -> BasisPoints {
        match self {
            Self::Protocol => MAX_PROTOCOL_FEE_BP,
            Self::Transaction => MAX_TRANSACTION_FEE_BP,
        }
    }
}

impl std::fmt::Display for FeeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol => write!(f, "protocol"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Result of splitting an amount into net and fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub net: Amount,
    pub fee: Amount,
}

/// Splits `amount` at `rate_bp`.
///
/// `fee = floor(amount * rate_bp / 10000)`, `net = amount - fee`.
///
/// # Errors
/// `InvalidAmount` when `amount` is zero.
pub fn apply_fee(amount: Amount, rate_bp: BasisPoints) -> Result<FeeSplit, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    // Clamp so the fee can never exceed the amount.
    let rate = u128::from(rate_bp.min(BPS_DENOMINATOR));
    let fee = u128::from(amount) * rate / u128::from(BPS_DENOMINATOR);
    let fee = Amount::try_from(fee).map_err(|_| LedgerError::ArithmeticOverflow)?;
    Ok(FeeSplit {
        net: amount - fee,
        fee,
    })
}

/// Validated pair of fee rates held by a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    protocol_fee_bp: BasisPoints,
    transaction_fee_bp: BasisPoints,
}

impl FeeSchedule {
    /// Creates a schedule, rejecting rates above the protocol maxima.
    ///
    /// # Errors
    /// `FeeTooHigh` naming the offending rate.
    pub fn new(
        protocol_fee_bp: BasisPoints,
        transaction_fee_bp: BasisPoints,
    ) -> Result<Self, LedgerError> {
        validate_rate(FeeKind::Protocol, protocol_fee_bp)?;
        validate_rate(FeeKind::Transaction, transaction_fee_bp)?;
        Ok(Self {
            protocol_fee_bp,
            transaction_fee_bp,
        })
    }

    /// No fees at all.
    pub const fn zero() -> Self {
        Self {
            protocol_fee_bp: 0,
            transaction_fee_bp: 0,
        }
    }

    pub const fn protocol_fee_bp(&self) -> BasisPoints {
        self.protocol_fee_bp
    }

    pub const fn transaction_fee_bp(&self) -> BasisPoints {
        self.transaction_fee_bp
    }

    /// Splits a gross stake into net stake and transaction fee.
    pub fn apply_transaction_fee(&self, amount: Amount) -> Result<FeeSplit, LedgerError> {
        apply_fee(amount, self.transaction_fee_bp)
    }

    /// Splits raw yield into bettor yield and protocol fee.
    ///
    /// Zero yield is not an error here: there is simply nothing to split.
    pub fn apply_protocol_fee(&self, raw_yield: Amount) -> Result<FeeSplit, LedgerError> {
        if raw_yield == 0 {
            return Ok(FeeSplit { net: 0, fee: 0 });
        }
        apply_fee(raw_yield, self.protocol_fee_bp)
    }
}

impl Default for FeeSchedule {
    /// 20% protocol fee, 1% transaction fee.
    fn default() -> Self {
        Self {
            protocol_fee_bp: 2_000,
            transaction_fee_bp: 100,
        }
    }
}

fn validate_rate(kind: FeeKind, rate_bp: BasisPoints) -> Result<(), LedgerError> {
    if rate_bp > kind.max_bp() {
        return Err(LedgerError::FeeTooHigh {
            kind,
            rate_bp,
            max_bp: kind.max_bp(),
        });
    }
    Ok(())
}

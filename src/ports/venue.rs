//! Yield Venue Port - External Yield Protocol Interface
//!
//! Defines the trait every yield-bearing venue adapter implements.
//! The engine only ever deposits, withdraws and reads balances and
//! live metrics through this boundary; how custody physically moves
//! is the adapter's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::market::{AccountId, Amount, AssetKind, BasisPoints};
use crate::domain::venue::ProtocolId;

/// Opaque proof that a deposit was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
  /// Venue-assigned receipt id.
  pub id: Uuid,
  /// Venue that accepted the deposit.
  pub protocol: ProtocolId,
  /// Amount credited.
  pub amount: Amount,
}

/// Failures reported by a venue adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
  /// The venue refused the operation (bad amount, paused, cap reached).
  #[error("{protocol} rejected the request: {reason}")]
  Rejected { protocol: ProtocolId, reason: String },

  /// The holder does not have enough at this venue.
  #[error("{protocol} holds {available} for the holder, {requested} requested")]
  InsufficientFunds {
    protocol: ProtocolId,
    requested: Amount,
    available: Amount,
  },

  /// The venue could not be reached or answered garbage.
  #[error("{protocol} unavailable: {reason}")]
  Unavailable { protocol: ProtocolId, reason: String },
}

/// Trait for yield venue adapters.
///
/// Balances are tracked per holder so one venue can host many
/// escrow accounts. Balances include accrued yield.
#[async_trait]
pub trait YieldVenue: Send + Sync + 'static {
  /// Protocol this adapter fronts.
  fn protocol(&self) -> ProtocolId;

  /// Asset this venue accepts.
  fn asset(&self) -> AssetKind;

  /// Deposit `amount` on behalf of `holder`.
  ///
  /// # Errors
  /// `Rejected` when the venue refuses the deposit (e.g. zero amount).
  async fn deposit(&self, holder: &AccountId, amount: Amount) -> Result<DepositReceipt, VenueError>;

  /// Withdraw `amount` from `holder`'s balance, returning the funds released.
  async fn withdraw(&self, holder: &AccountId, amount: Amount) -> Result<Amount, VenueError>;

  /// Current balance of `holder`, yield included.
  async fn balance(&self, holder: &AccountId) -> Result<Amount, VenueError>;

  /// Current annual yield in basis points.
  async fn current_apy(&self) -> Result<BasisPoints, VenueError>;

  /// Total value locked across all holders.
  async fn total_value_locked(&self) -> Result<Amount, VenueError>;
}

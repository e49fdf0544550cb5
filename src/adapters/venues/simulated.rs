//! In-process yield venue.
//!
//! Keeps per-holder balances in memory and accrues simple interest at
//! a configurable APY when told how much time has passed. Deposits can
//! be switched off to exercise failure paths.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::market::{AccountId, Amount, AssetKind, BasisPoints, BPS_DENOMINATOR};
use crate::domain::venue::ProtocolId;
use crate::ports::venue::{DepositReceipt, VenueError, YieldVenue};

const SECONDS_PER_YEAR: u128 = 365 * 24 * 3_600;

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<AccountId, Amount>,
    apy_bp: BasisPoints,
    accepting_deposits: bool,
    available: bool,
}

/// Simulated lending venue for one asset.
#[derive(Debug)]
pub struct SimulatedVenue {
    protocol: ProtocolId,
    asset: AssetKind,
    /// Liquidity supplied by everyone else; added to TVL.
    base_tvl: Amount,
    book: RwLock<Book>,
}

impl SimulatedVenue {
    pub fn new(protocol: ProtocolId, asset: AssetKind, apy_bp: BasisPoints) -> Self {
        Self {
            protocol,
            asset,
            base_tvl: 0,
            book: RwLock::new(Book {
                balances: HashMap::new(),
                apy_bp,
                accepting_deposits: true,
                available: true,
            }),
        }
    }

    /// Sets the outside liquidity reported in TVL.
    #[must_use]
    pub const fn with_base_tvl(mut self, base_tvl: Amount) -> Self {
        self.base_tvl = base_tvl;
        self
    }

    pub async fn set_apy(&self, apy_bp: BasisPoints) {
        self.book.write().await.apy_bp = apy_bp;
    }

    /// Toggles rejection of every deposit.
    pub async fn set_accepting_deposits(&self, accepting: bool) {
        self.book.write().await.accepting_deposits = accepting;
    }

    /// Toggles an outage: every call fails while unavailable.
    pub async fn set_available(&self, available: bool) {
        self.book.write().await.available = available;
    }

    /// Credits `amount` of yield to one holder.
    pub async fn credit_yield(&self, holder: &AccountId, amount: Amount) {
        let mut book = self.book.write().await;
        let balance = book.balances.entry(holder.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Removes up to `amount` from one holder, modelling a venue loss.
    pub async fn slash(&self, holder: &AccountId, amount: Amount) {
        let mut book = self.book.write().await;
        if let Some(balance) = book.balances.get_mut(holder) {
            *balance = balance.saturating_sub(amount);
        }
    }

    /// Accrues simple interest on every balance for `elapsed_secs`.
    ///
    /// Returns the total yield credited.
    pub async fn accrue(&self, elapsed_secs: u64) -> Amount {
        let mut book = self.book.write().await;
        let apy = u128::from(book.apy_bp);
        let elapsed = u128::from(elapsed_secs);
        let denominator = u128::from(BPS_DENOMINATOR) * SECONDS_PER_YEAR;

        let mut credited: Amount = 0;
        for balance in book.balances.values_mut() {
            let interest = u128::from(*balance) * apy * elapsed / denominator;
            let interest = Amount::try_from(interest).unwrap_or(Amount::MAX);
            *balance = balance.saturating_add(interest);
            credited = credited.saturating_add(interest);
        }
        debug!(protocol = %self.protocol, elapsed_secs, credited, "Accrued yield");
        credited
    }

    fn unavailable(&self) -> VenueError {
        VenueError::Unavailable {
            protocol: self.protocol,
            reason: "venue offline".to_string(),
        }
    }
}

#[async_trait]
impl YieldVenue for SimulatedVenue {
    fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    fn asset(&self) -> AssetKind {
        self.asset
    }

    async fn deposit(&self, holder: &AccountId, amount: Amount) -> Result<DepositReceipt, VenueError> {
        let mut book = self.book.write().await;
        if !book.available {
            return Err(self.unavailable());
        }
        if amount == 0 {
            return Err(VenueError::Rejected {
                protocol: self.protocol,
                reason: "deposit amount must be positive".to_string(),
            });
        }
        if !book.accepting_deposits {
            return Err(VenueError::Rejected {
                protocol: self.protocol,
                reason: "deposits paused".to_string(),
            });
        }
        let balance = book.balances.entry(holder.clone()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or_else(|| VenueError::Rejected {
            protocol: self.protocol,
            reason: "balance overflow".to_string(),
        })?;
        Ok(DepositReceipt {
            id: Uuid::new_v4(),
            protocol: self.protocol,
            amount,
        })
    }

    async fn withdraw(&self, holder: &AccountId, amount: Amount) -> Result<Amount, VenueError> {
        let mut book = self.book.write().await;
        if !book.available {
            return Err(self.unavailable());
        }
        let available = book.balances.get(holder).copied().unwrap_or(0);
        if amount > available {
            return Err(VenueError::InsufficientFunds {
                protocol: self.protocol,
                requested: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            book.balances.remove(holder);
        } else {
            book.balances.insert(holder.clone(), remaining);
        }
        Ok(amount)
    }

    async fn balance(&self, holder: &AccountId) -> Result<Amount, VenueError> {
        let book = self.book.read().await;
        if !book.available {
            return Err(self.unavailable());
        }
        Ok(book.balances.get(holder).copied().unwrap_or(0))
    }

    async fn current_apy(&self) -> Result<BasisPoints, VenueError> {
        let book = self.book.read().await;
        if !book.available {
            return Err(self.unavailable());
        }
        Ok(book.apy_bp)
    }

    async fn total_value_locked(&self) -> Result<Amount, VenueError> {
        let book = self.book.read().await;
        if !book.available {
            return Err(self.unavailable());
        }
        Ok(book
            .balances
            .values()
            .fold(self.base_tvl, |acc, b| acc.saturating_add(*b)))
    }
}

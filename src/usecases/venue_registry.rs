//! Venue Registry - Known Venues and Allocation Bookkeeping
//!
//! Tracks which yield venues are registered for an asset, their
//! declared risk tier, which holders have funds routed through it and
//! how much principal each holder has put into each venue. The
//! registry itself is not locked; the `ProtocolSelector` owns it
//! behind its exclusive lock.
//!
//! Holder membership and principal are kept apart: withdrawals that
//! include yield can drain the principal books while the venue still
//! holds funds for that holder.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::error::LedgerError;
use crate::domain::market::{AccountId, Amount, AssetKind};
use crate::domain::venue::{ProtocolId, RiskTier};
use crate::ports::venue::YieldVenue;

/// A registered venue.
#[derive(Clone)]
pub struct VenueRecord {
  /// Protocol identity; unique per registry.
  pub protocol: ProtocolId,
  /// Declared risk ordinal.
  pub risk_tier: RiskTier,
  /// Adapter used for live metrics and fund movement.
  pub venue: Arc<dyn YieldVenue>,
}

impl std::fmt::Debug for VenueRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VenueRecord")
      .field("protocol", &self.protocol)
      .field("risk_tier", &self.risk_tier)
      .finish_non_exhaustive()
  }
}

/// Registered venues for one asset plus per-holder principal allocations.
#[derive(Debug)]
pub struct VenueRegistry {
  asset: AssetKind,
  venues: Vec<VenueRecord>,
  /// Every holder that has deposited and not been forgotten.
  holders: BTreeSet<AccountId>,
  /// Principal routed per holder per venue. Excludes accrued yield.
  allocations: HashMap<AccountId, BTreeMap<ProtocolId, Amount>>,
}

impl VenueRegistry {
  /// Create an empty registry for `asset`.
  pub fn new(asset: AssetKind) -> Self {
    Self {
      asset,
      venues: Vec::new(),
      holders: BTreeSet::new(),
      allocations: HashMap::new(),
    }
  }

  pub const fn asset(&self) -> AssetKind {
    self.asset
  }

  /// Register a venue.
  ///
  /// # Errors
  /// `AssetMismatch` when the venue settles another asset,
  /// `VenueAlreadyRegistered` when its protocol already has a venue.
  pub fn register(
    &mut self,
    venue: Arc<dyn YieldVenue>,
    risk_tier: RiskTier,
  ) -> Result<ProtocolId, LedgerError> {
    if venue.asset() != self.asset {
      return Err(LedgerError::AssetMismatch {
        expected: self.asset,
        found: venue.asset(),
      });
    }
    let protocol = venue.protocol();
    if self.get(protocol).is_some() {
      return Err(LedgerError::VenueAlreadyRegistered(protocol));
    }
    self.venues.push(VenueRecord {
      protocol,
      risk_tier,
      venue,
    });
    Ok(protocol)
  }

  /// Look up a venue by protocol.
  pub fn get(&self, protocol: ProtocolId) -> Option<&VenueRecord> {
    self.venues.iter().find(|r| r.protocol == protocol)
  }

  /// All registered venues in registration order.
  pub fn records(&self) -> &[VenueRecord] {
    &self.venues
  }

  pub fn is_empty(&self) -> bool {
    self.venues.is_empty()
  }

  /// Book principal routed into a venue.
  pub fn record_deposit(&mut self, holder: &AccountId, protocol: ProtocolId, amount: Amount) {
    if !self.holders.contains(holder) {
      self.holders.insert(holder.clone());
    }
    let slot = self
      .allocations
      .entry(holder.clone())
      .or_default()
      .entry(protocol)
      .or_insert(0);
    *slot = slot.saturating_add(amount);
  }

  /// Book funds taken out of a venue. Withdrawals may include yield,
  /// so the allocation floors at zero. The holder stays known: the
  /// venue may still hold yield for it.
  pub fn record_withdrawal(&mut self, holder: &AccountId, protocol: ProtocolId, amount: Amount) {
    if let Some(per_venue) = self.allocations.get_mut(holder) {
      if let Some(slot) = per_venue.get_mut(&protocol) {
        *slot = slot.saturating_sub(amount);
        if *slot == 0 {
          per_venue.remove(&protocol);
        }
      }
      if per_venue.is_empty() {
        self.allocations.remove(holder);
      }
    }
  }

  /// Principal `holder` has routed into each venue.
  pub fn allocations(&self, holder: &AccountId) -> BTreeMap<ProtocolId, Amount> {
    self.allocations.get(holder).cloned().unwrap_or_default()
  }

  /// Every known holder, sorted.
  pub fn holders(&self) -> Vec<AccountId> {
    self.holders.iter().cloned().collect()
  }

  /// Drop a holder whose balance is zero at every venue.
  pub fn forget_holder(&mut self, holder: &AccountId) {
    self.holders.remove(holder);
    self.allocations.remove(holder);
  }
}

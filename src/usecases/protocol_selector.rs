//! Protocol Selector - Venue Scoring and Fund Routing
//!
//! Owns the venue registry behind an exclusive lock and routes
//! escrowed funds:
//! - deposits go to the best-scoring venue (60/20/20 APY/TVL/risk)
//! - withdrawals drain venues first-fit in score order
//! - total balance is read across every venue under the same lock,
//!   so it is consistent with all committed deposits and withdrawals
//!
//! Venues whose metrics cannot be read are skipped for selection and
//! drained last on withdrawal.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::LedgerError;
use crate::domain::market::{AccountId, Amount, AssetKind};
use crate::domain::rebalance::{RebalanceCandidate, RebalanceInstruction};
use crate::domain::venue::{
  self, ProtocolId, RiskTier, ScoredVenue, SelectionPolicy, VenueMetrics,
};
use crate::ports::venue::{DepositReceipt, VenueError, YieldVenue};

use super::venue_registry::{VenueRecord, VenueRegistry};

/// Funds released by a withdrawal, per venue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Withdrawal {
  /// `(venue, amount)` legs in the order they were drained.
  pub legs: Vec<(ProtocolId, Amount)>,
  /// Sum of all legs.
  pub total: Amount,
}

/// A holder's live balance at one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueBalance {
  pub protocol: ProtocolId,
  /// Live balance, yield included.
  pub balance: Amount,
  /// Principal booked into this venue.
  pub principal: Amount,
}

/// Routes escrowed funds across registered yield venues.
pub struct ProtocolSelector {
  asset: AssetKind,
  policy: SelectionPolicy,
  registry: Mutex<VenueRegistry>,
}

impl ProtocolSelector {
  /// Create a selector for `asset` with the given selection filters.
  pub fn new(asset: AssetKind, policy: SelectionPolicy) -> Self {
    Self {
      asset,
      policy,
      registry: Mutex::new(VenueRegistry::new(asset)),
    }
  }

  pub const fn asset(&self) -> AssetKind {
    self.asset
  }

  pub const fn policy(&self) -> &SelectionPolicy {
    &self.policy
  }

  /// Register a venue adapter with its declared risk tier.
  #[instrument(skip(self, venue), fields(protocol = %venue.protocol(), tier = risk_tier.get()))]
  pub async fn register_venue(
    &self,
    venue: Arc<dyn YieldVenue>,
    risk_tier: RiskTier,
  ) -> Result<ProtocolId, LedgerError> {
    let mut registry = self.registry.lock().await;
    let protocol = registry.register(venue, risk_tier)?;
    info!(asset = %self.asset, venues = registry.records().len(), "Venue registered");
    Ok(protocol)
  }

  /// Registered protocols in registration order.
  pub async fn registered(&self) -> Vec<(ProtocolId, RiskTier)> {
    let registry = self.registry.lock().await;
    registry
      .records()
      .iter()
      .map(|r| (r.protocol, r.risk_tier))
      .collect()
  }

  /// Live metrics for every venue that answered.
  pub async fn venue_metrics(&self) -> Vec<VenueMetrics> {
    let registry = self.registry.lock().await;
    collect_metrics(&registry).await
  }

  /// Best venue under the selector's own policy.
  pub async fn select_best(&self) -> Result<ScoredVenue, LedgerError> {
    self.select_best_with(&self.policy).await
  }

  /// Best venue under an explicit APY floor and risk ceiling.
  ///
  /// Falls back to the highest-APY venue when the filter leaves nothing.
  pub async fn select_best_with(&self, policy: &SelectionPolicy) -> Result<ScoredVenue, LedgerError> {
    let registry = self.registry.lock().await;
    best_venue(&registry, policy).await
  }

  /// Deposit `amount` for `holder` into the best-scoring venue.
  ///
  /// # Errors
  /// `DepositFailed` when the chosen venue rejects the deposit,
  /// `NoVenueAvailable` when nothing is registered or reachable.
  #[instrument(skip(self), fields(holder = %holder))]
  pub async fn auto_deposit(
    &self,
    holder: &AccountId,
    amount: Amount,
  ) -> Result<DepositReceipt, LedgerError> {
    let mut registry = self.registry.lock().await;
    let best = best_venue(&registry, &self.policy).await?;
    let protocol = best.metrics.protocol;
    let record = registry
      .get(protocol)
      .cloned()
      .ok_or(LedgerError::NoVenueAvailable)?;

    let receipt = record.venue.deposit(holder, amount).await.map_err(|e| {
      warn!(protocol = %protocol, amount, error = %e, "Venue rejected deposit");
      LedgerError::DepositFailed(e.to_string())
    })?;

    registry.record_deposit(holder, protocol, receipt.amount);
    info!(
      protocol = %protocol,
      amount = receipt.amount,
      apy_pct = %venue::bp_to_percent(best.metrics.apy_bp),
      "Funds routed to venue"
    );
    Ok(receipt)
  }

  /// Withdraw `amount` for `holder`, draining venues in score order.
  ///
  /// A venue that cannot cover the rest is emptied and the remainder is
  /// taken from the next one. If any leg fails, legs already taken are
  /// deposited back before the error is returned.
  ///
  /// # Errors
  /// `InsufficientBalance` when all venues together hold less than `amount`.
  #[instrument(skip(self), fields(holder = %holder))]
  pub async fn auto_withdraw(
    &self,
    holder: &AccountId,
    amount: Amount,
  ) -> Result<Withdrawal, LedgerError> {
    if amount == 0 {
      return Ok(Withdrawal::default());
    }
    let mut registry = self.registry.lock().await;

    let mut plan = Vec::new();
    let mut available: Amount = 0;
    for record in withdrawal_order(&registry).await {
      let balance = record.venue.balance(holder).await.map_err(venue_failure)?;
      available = available.saturating_add(balance);
      plan.push((record, balance));
    }

    if available < amount {
      return Err(LedgerError::InsufficientBalance {
        requested: amount,
        available,
      });
    }

    let mut withdrawal = Withdrawal::default();
    let mut remaining = amount;
    for (record, balance) in plan {
      if remaining == 0 {
        break;
      }
      let take = balance.min(remaining);
      if take == 0 {
        continue;
      }
      match record.venue.withdraw(holder, take).await {
        Ok(released) => {
          registry.record_withdrawal(holder, record.protocol, released);
          withdrawal.legs.push((record.protocol, released));
          withdrawal.total = withdrawal.total.saturating_add(released);
          remaining = remaining.saturating_sub(released);
        }
        Err(e) => {
          warn!(protocol = %record.protocol, take, error = %e, "Venue withdrawal failed, restoring legs");
          restore_legs(&mut registry, holder, &withdrawal.legs).await;
          return Err(venue_failure(e));
        }
      }
    }

    if remaining > 0 {
      restore_legs(&mut registry, holder, &withdrawal.legs).await;
      return Err(LedgerError::InsufficientBalance {
        requested: amount,
        available: withdrawal.total,
      });
    }

    debug!(amount, legs = withdrawal.legs.len(), "Withdrawal complete");
    Ok(withdrawal)
  }

  /// Sum of `holder`'s balances across every registered venue.
  pub async fn get_total_balance(&self, holder: &AccountId) -> Result<Amount, LedgerError> {
    let registry = self.registry.lock().await;
    let mut total: Amount = 0;
    for record in registry.records() {
      let balance = record.venue.balance(holder).await.map_err(venue_failure)?;
      total = total
        .checked_add(balance)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    }
    Ok(total)
  }

  /// Per-venue breakdown of `holder`'s position.
  pub async fn position(&self, holder: &AccountId) -> Result<Vec<VenueBalance>, LedgerError> {
    let registry = self.registry.lock().await;
    let principal = registry.allocations(holder);
    let mut out = Vec::with_capacity(registry.records().len());
    for record in registry.records() {
      let balance = record.venue.balance(holder).await.map_err(venue_failure)?;
      out.push(VenueBalance {
        protocol: record.protocol,
        balance,
        principal: principal.get(&record.protocol).copied().unwrap_or(0),
      });
    }
    Ok(out)
  }

  /// Holders that have deposited and may still hold funds.
  pub async fn holders(&self) -> Vec<AccountId> {
    self.registry.lock().await.holders()
  }

  /// Current-versus-best comparison for every holder.
  ///
  /// The current venue is the one holding the largest live balance for
  /// the holder, yield included; the amount is that balance. Holders
  /// every venue reports empty for are forgotten.
  pub async fn rebalance_candidates(&self) -> Result<Vec<RebalanceCandidate>, LedgerError> {
    let mut registry = self.registry.lock().await;
    let metrics = collect_metrics(&registry).await;
    let Some(best) = venue::select_best(&metrics, &self.policy) else {
      return Ok(Vec::new());
    };
    let all_readable = metrics.len() == registry.records().len();

    let mut candidates = Vec::new();
    let mut drained = Vec::new();
    for holder in registry.holders() {
      let mut current: Option<(VenueMetrics, Amount)> = None;
      for m in &metrics {
        let Some(record) = registry.get(m.protocol) else {
          continue;
        };
        let balance = record.venue.balance(&holder).await.map_err(venue_failure)?;
        if balance > 0 && current.is_none_or(|(_, held)| balance > held) {
          current = Some((*m, balance));
        }
      }

      match current {
        Some((current, amount)) => candidates.push(RebalanceCandidate {
          holder,
          current: current.protocol,
          current_apy_bp: current.apy_bp,
          best: best.metrics.protocol,
          best_apy_bp: best.metrics.apy_bp,
          amount,
        }),
        None if all_readable => drained.push(holder),
        None => debug!(holder = %holder, "No readable venue holds funds for holder"),
      }
    }

    for holder in &drained {
      registry.forget_holder(holder);
    }
    Ok(candidates)
  }

  /// Move funds between two venues for one holder.
  ///
  /// Moves at most the holder's live balance at the source. If the
  /// target rejects the deposit, the funds go back into the source.
  /// Returns the amount moved.
  #[instrument(skip(self, instruction), fields(holder = %instruction.holder, from = %instruction.from, to = %instruction.to))]
  pub async fn move_funds(&self, instruction: &RebalanceInstruction) -> Result<Amount, LedgerError> {
    let mut registry = self.registry.lock().await;
    let from = registry
      .get(instruction.from)
      .cloned()
      .ok_or(LedgerError::NoVenueAvailable)?;
    let to = registry
      .get(instruction.to)
      .cloned()
      .ok_or(LedgerError::NoVenueAvailable)?;
    let holder = &instruction.holder;

    let balance = from.venue.balance(holder).await.map_err(venue_failure)?;
    let amount = instruction.amount.min(balance);
    if amount == 0 {
      return Ok(0);
    }

    let released = from.venue.withdraw(holder, amount).await.map_err(venue_failure)?;
    match to.venue.deposit(holder, released).await {
      Ok(receipt) => {
        registry.record_withdrawal(holder, from.protocol, released);
        registry.record_deposit(holder, to.protocol, receipt.amount);
        info!(amount = receipt.amount, "Funds moved between venues");
        Ok(receipt.amount)
      }
      Err(e) => {
        warn!(error = %e, "Target venue rejected rebalance deposit, restoring source");
        if let Err(restore) = from.venue.deposit(holder, released).await {
          warn!(error = %restore, amount = released, "Failed to restore funds to source venue");
          registry.record_withdrawal(holder, from.protocol, released);
        }
        Err(LedgerError::DepositFailed(e.to_string()))
      }
    }
  }
}

fn venue_failure(e: VenueError) -> LedgerError {
  match e {
    VenueError::InsufficientFunds {
      requested,
      available,
      ..
    } => LedgerError::InsufficientBalance {
      requested,
      available,
    },
    other => LedgerError::Venue(other.to_string()),
  }
}

/// Reads APY and TVL from every venue, skipping the ones that fail.
async fn collect_metrics(registry: &VenueRegistry) -> Vec<VenueMetrics> {
  let mut metrics = Vec::with_capacity(registry.records().len());
  for record in registry.records() {
    let apy = record.venue.current_apy().await;
    let tvl = record.venue.total_value_locked().await;
    match (apy, tvl) {
      (Ok(apy_bp), Ok(tvl)) => metrics.push(VenueMetrics {
        protocol: record.protocol,
        apy_bp,
        tvl,
        risk_tier: record.risk_tier,
      }),
      (Err(e), _) | (_, Err(e)) => {
        warn!(protocol = %record.protocol, error = %e, "Skipping venue with unreadable metrics");
      }
    }
  }
  metrics
}

async fn best_venue(registry: &VenueRegistry, policy: &SelectionPolicy) -> Result<ScoredVenue, LedgerError> {
  if registry.is_empty() {
    return Err(LedgerError::NoVenueAvailable);
  }
  let metrics = collect_metrics(registry).await;
  venue::select_best(&metrics, policy).ok_or(LedgerError::NoVenueAvailable)
}

/// Ranked venues first (highest score), then any without readable metrics.
async fn withdrawal_order(registry: &VenueRegistry) -> Vec<VenueRecord> {
  let metrics = collect_metrics(registry).await;
  let mut order: Vec<VenueRecord> = venue::rank(&metrics)
    .iter()
    .filter_map(|scored| registry.get(scored.metrics.protocol).cloned())
    .collect();
  for record in registry.records() {
    if !order.iter().any(|r| r.protocol == record.protocol) {
      order.push(record.clone());
    }
  }
  order
}

/// Puts already-withdrawn legs back where they came from.
async fn restore_legs(registry: &mut VenueRegistry, holder: &AccountId, legs: &[(ProtocolId, Amount)]) {
  for (protocol, amount) in legs {
    let Some(record) = registry.get(*protocol).cloned() else {
      continue;
    };
    match record.venue.deposit(holder, *amount).await {
      Ok(receipt) => registry.record_deposit(holder, *protocol, receipt.amount),
      Err(e) => warn!(protocol = %protocol, amount, error = %e, "Failed to restore withdrawal leg"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::venues::SimulatedVenue;

  fn tier(t: u8) -> RiskTier {
    RiskTier::try_from(t).unwrap()
  }

  async fn selector_with(apys: &[(ProtocolId, u64)]) -> (ProtocolSelector, Vec<Arc<SimulatedVenue>>) {
    let selector = ProtocolSelector::new(AssetKind::Usdc, SelectionPolicy::default());
    let mut venues = Vec::new();
    for (protocol, apy) in apys {
      let venue = Arc::new(SimulatedVenue::new(*protocol, AssetKind::Usdc, *apy));
      selector.register_venue(venue.clone(), tier(3)).await.unwrap();
      venues.push(venue);
    }
    (selector, venues)
  }

  #[tokio::test]
  async fn test_deposit_routes_to_highest_score() {
    let (selector, venues) = selector_with(&[
      (ProtocolId::Navi, 400),
      (ProtocolId::Scallop, 500),
      (ProtocolId::Suilend, 600),
    ])
    .await;
    let holder = AccountId::from("h");

    let receipt = selector.auto_deposit(&holder, 1_000).await.unwrap();
    assert_eq!(receipt.protocol, ProtocolId::Suilend);
    assert_eq!(venues[2].balance(&holder).await.unwrap(), 1_000);
    assert_eq!(selector.get_total_balance(&holder).await.unwrap(), 1_000);
  }

  #[tokio::test]
  async fn test_rejected_deposit_maps_to_deposit_failed() {
    let (selector, _venues) = selector_with(&[(ProtocolId::Navi, 400)]).await;
    let err = selector.auto_deposit(&AccountId::from("h"), 0).await.unwrap_err();
    assert!(matches!(err, LedgerError::DepositFailed(_)));
  }

  #[tokio::test]
  async fn test_no_venue_registered() {
    let selector = ProtocolSelector::new(AssetKind::Usdc, SelectionPolicy::default());
    assert_eq!(
      selector.auto_deposit(&AccountId::from("h"), 10).await.unwrap_err(),
      LedgerError::NoVenueAvailable
    );
  }

  #[tokio::test]
  async fn test_withdraw_splits_across_venues_in_score_order() {
    let (selector, venues) = selector_with(&[
      (ProtocolId::Navi, 400),
      (ProtocolId::Suilend, 600),
    ])
    .await;
    let holder = AccountId::from("h");
    venues[0].deposit(&holder, 500).await.unwrap();
    venues[1].deposit(&holder, 300).await.unwrap();

    let withdrawal = selector.auto_withdraw(&holder, 700).await.unwrap();
    assert_eq!(
      withdrawal.legs,
      vec![(ProtocolId::Suilend, 300), (ProtocolId::Navi, 400)]
    );
    assert_eq!(withdrawal.total, 700);
    assert_eq!(selector.get_total_balance(&holder).await.unwrap(), 100);
  }

  #[tokio::test]
  async fn test_withdraw_more_than_held_fails_without_moving_funds() {
    let (selector, venues) = selector_with(&[(ProtocolId::Navi, 400)]).await;
    let holder = AccountId::from("h");
    venues[0].deposit(&holder, 500).await.unwrap();

    let err = selector.auto_withdraw(&holder, 501).await.unwrap_err();
    assert_eq!(
      err,
      LedgerError::InsufficientBalance {
        requested: 501,
        available: 500
      }
    );
    assert_eq!(venues[0].balance(&holder).await.unwrap(), 500);
  }

  #[tokio::test]
  async fn test_move_funds_restores_source_when_target_rejects() {
    let (selector, venues) = selector_with(&[
      (ProtocolId::Navi, 400),
      (ProtocolId::Scallop, 900),
    ])
    .await;
    let holder = AccountId::from("h");
    selector.auto_deposit(&holder, 5_000).await.unwrap();
    assert_eq!(venues[1].balance(&holder).await.unwrap(), 5_000);

    venues[0].set_accepting_deposits(false).await;
    let instruction = RebalanceInstruction {
      holder: holder.clone(),
      from: ProtocolId::Scallop,
      to: ProtocolId::Navi,
      amount: 5_000,
      gap_bp: 0,
    };
    assert!(matches!(
      selector.move_funds(&instruction).await,
      Err(LedgerError::DepositFailed(_))
    ));
    assert_eq!(venues[1].balance(&holder).await.unwrap(), 5_000);
  }

  #[tokio::test]
  async fn test_rebalance_candidates_report_current_and_best() {
    let (selector, venues) = selector_with(&[
      (ProtocolId::Navi, 400),
      (ProtocolId::Scallop, 500),
    ])
    .await;
    let holder = AccountId::from("h");
    selector.auto_deposit(&holder, 2_000).await.unwrap();
    venues[0].set_apy(800).await;

    let candidates = selector.rebalance_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].current, ProtocolId::Scallop);
    assert_eq!(candidates[0].best, ProtocolId::Navi);
    assert_eq!(candidates[0].amount, 2_000);
  }

  #[tokio::test]
  async fn test_yield_left_after_principal_is_drained_stays_rebalanceable() {
    let (selector, venues) = selector_with(&[
      (ProtocolId::Navi, 500),
      (ProtocolId::Scallop, 400),
    ])
    .await;
    let holder = AccountId::from("escrow:USDC:market:0");
    selector.auto_deposit(&holder, 10_000).await.unwrap();
    venues[0].credit_yield(&holder, 3_000).await;
    selector.auto_withdraw(&holder, 11_000).await.unwrap();
    venues[1].set_apy(2_000).await;

    assert_eq!(selector.holders().await, vec![holder.clone()]);
    let position = selector.position(&holder).await.unwrap();
    assert_eq!(position[0].balance, 2_000);
    assert_eq!(position[0].principal, 0);

    let candidates = selector.rebalance_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].current, ProtocolId::Navi);
    assert_eq!(candidates[0].best, ProtocolId::Scallop);
    assert_eq!(candidates[0].amount, 2_000);
  }

  #[tokio::test]
  async fn test_empty_holder_is_forgotten() {
    let (selector, _venues) = selector_with(&[(ProtocolId::Navi, 500)]).await;
    let holder = AccountId::from("escrow:USDC:market:0");
    selector.auto_deposit(&holder, 5_000).await.unwrap();
    selector.auto_withdraw(&holder, 5_000).await.unwrap();
    assert_eq!(selector.holders().await.len(), 1);

    assert!(selector.rebalance_candidates().await.unwrap().is_empty());
    assert!(selector.holders().await.is_empty());
  }
}

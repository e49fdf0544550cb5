//! Market Ledger - Market Lifecycle and Settlement
//!
//! The aggregate root of the settlement engine. Owns every market and
//! bet for one asset, the fee configuration and fee totals, and the
//! pause flag. All mutating operations run under one exclusive lock,
//! held across the venue call they depend on, so:
//! - a bet is committed only if its net stake reached a venue
//! - yield distribution for a market is written in one step before
//!   any claim can read it
//! - `claimed` is checked and set under the same lock as the payout
//!
//! Lock order is always ledger state, then venue registry.
//!
//! Each market escrows its stakes under its own holder identity, so
//! resolution reads exactly that market's venue position.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::auth::{AdminCap, LedgerId};
use crate::domain::error::LedgerError;
use crate::domain::events::LedgerEvent;
use crate::domain::fees::FeeSchedule;
use crate::domain::market::{
  AccountId, Amount, AssetKind, Bet, BetId, Market, MarketId, MarketState, Odds, Position,
};
use crate::domain::payout;
use crate::domain::venue::{ProtocolId, RiskTier};
use crate::ports::authorizer::Authorizer;
use crate::ports::clock::Clock;
use crate::ports::event_sink::EventSink;
use crate::ports::repository::{LedgerSnapshot, MarketRecord};
use crate::ports::venue::YieldVenue;

use super::protocol_selector::{ProtocolSelector, Withdrawal};

/// Snapshot format written by [`MarketLedger::snapshot`].
pub const SNAPSHOT_VERSION: &str = "1";

/// Static ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
  pub asset: AssetKind,
  /// Prefix of every market escrow holder identity.
  pub escrow_prefix: String,
  pub fees: FeeSchedule,
  pub fee_recipient: AccountId,
}

/// Result of resolving a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
  pub market_id: MarketId,
  pub outcome: Position,
  /// Venue balance of the market's escrow at resolution.
  pub total_balance: Amount,
  pub total_bet: Amount,
  pub raw_yield: Amount,
  pub protocol_fee: Amount,
  /// Yield left for bettors.
  pub final_yield: Amount,
  /// Sum of the yield shares written; at most `final_yield`.
  pub distributed: Amount,
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
  pub market_id: MarketId,
  pub bet_id: BetId,
  pub claimant: AccountId,
  pub principal: Amount,
  pub yield_share: Amount,
  /// `principal + yield_share`, released from venues.
  pub total: Amount,
  pub withdrawal: Withdrawal,
}

/// Running fee totals not yet swept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeTotals {
  pub protocol: Amount,
  pub transaction: Amount,
}

/// Fees paid out to the recipient by [`MarketLedger::sweep_fees`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSweep {
  pub recipient: AccountId,
  pub protocol_fees: Amount,
  pub transaction_fees: Amount,
}

/// Mutable ledger state behind the aggregate lock.
#[derive(Debug)]
struct LedgerState {
  markets: BTreeMap<MarketId, MarketRecord>,
  /// `(market, bet)` ids per bettor.
  user_bets: HashMap<AccountId, Vec<(MarketId, BetId)>>,
  fees: FeeSchedule,
  fee_recipient: AccountId,
  protocol_fees_collected: Amount,
  transaction_fees_collected: Amount,
  paused: bool,
  next_market_id: MarketId,
}

impl LedgerState {
  fn record(&self, market_id: MarketId) -> Result<&MarketRecord, LedgerError> {
    self
      .markets
      .get(&market_id)
      .ok_or(LedgerError::MarketNotFound(market_id))
  }

  fn record_mut(&mut self, market_id: MarketId) -> Result<&mut MarketRecord, LedgerError> {
    self
      .markets
      .get_mut(&market_id)
      .ok_or(LedgerError::MarketNotFound(market_id))
  }
}

fn bet_in(record: &MarketRecord, bet_id: BetId) -> Result<&Bet, LedgerError> {
  usize::try_from(bet_id)
    .ok()
    .and_then(|idx| record.bets.get(idx))
    .ok_or(LedgerError::BetNotFound {
      market_id: record.market.id,
      bet_id,
    })
}

/// Settlement ledger for one asset.
pub struct MarketLedger<A: Authorizer, C: Clock, S: EventSink> {
  id: LedgerId,
  asset: AssetKind,
  escrow_prefix: String,
  selector: Arc<ProtocolSelector>,
  authorizer: Arc<A>,
  clock: Arc<C>,
  sink: Arc<S>,
  state: Mutex<LedgerState>,
}

impl<A: Authorizer, C: Clock, S: EventSink> MarketLedger<A, C, S> {
  /// Create an empty ledger.
  ///
  /// # Errors
  /// `AssetMismatch` when the selector routes a different asset.
  pub fn new(
    id: LedgerId,
    settings: LedgerSettings,
    selector: Arc<ProtocolSelector>,
    authorizer: Arc<A>,
    clock: Arc<C>,
    sink: Arc<S>,
  ) -> Result<Self, LedgerError> {
    check_asset(settings.asset, &selector)?;
    Ok(Self {
      id,
      asset: settings.asset,
      escrow_prefix: settings.escrow_prefix,
      selector,
      authorizer,
      clock,
      sink,
      state: Mutex::new(LedgerState {
        markets: BTreeMap::new(),
        user_bets: HashMap::new(),
        fees: settings.fees,
        fee_recipient: settings.fee_recipient,
        protocol_fees_collected: 0,
        transaction_fees_collected: 0,
        paused: false,
        next_market_id: 0,
      }),
    })
  }

  /// Rebuild a ledger from a snapshot.
  ///
  /// Fee rates are validated again; the per-user index is rebuilt from
  /// the bets.
  ///
  /// # Errors
  /// `AssetMismatch` on a selector for another asset, `FeeTooHigh` on a
  /// snapshot carrying out-of-range rates.
  pub fn restore(
    snapshot: LedgerSnapshot,
    selector: Arc<ProtocolSelector>,
    authorizer: Arc<A>,
    clock: Arc<C>,
    sink: Arc<S>,
  ) -> Result<Self, LedgerError> {
    check_asset(snapshot.asset, &selector)?;
    let fees = FeeSchedule::new(
      snapshot.fees.protocol_fee_bp(),
      snapshot.fees.transaction_fee_bp(),
    )?;

    let mut markets = BTreeMap::new();
    let mut user_bets: HashMap<AccountId, Vec<(MarketId, BetId)>> = HashMap::new();
    for record in snapshot.markets {
      for bet in &record.bets {
        user_bets
          .entry(bet.bettor.clone())
          .or_default()
          .push((bet.market_id, bet.id));
      }
      markets.insert(record.market.id, record);
    }
    for bets in user_bets.values_mut() {
      bets.sort_unstable();
    }

    info!(
      ledger = %snapshot.ledger_id,
      markets = markets.len(),
      "Ledger restored from snapshot"
    );

    Ok(Self {
      id: snapshot.ledger_id,
      asset: snapshot.asset,
      escrow_prefix: snapshot.escrow_prefix,
      selector,
      authorizer,
      clock,
      sink,
      state: Mutex::new(LedgerState {
        markets,
        user_bets,
        fees,
        fee_recipient: snapshot.fee_recipient,
        protocol_fees_collected: snapshot.protocol_fees_collected,
        transaction_fees_collected: snapshot.transaction_fees_collected,
        paused: snapshot.paused,
        next_market_id: snapshot.next_market_id,
      }),
    })
  }

  pub const fn id(&self) -> LedgerId {
    self.id
  }

  pub const fn asset(&self) -> AssetKind {
    self.asset
  }

  pub fn selector(&self) -> &Arc<ProtocolSelector> {
    &self.selector
  }

  fn authorize(&self, cap: &AdminCap) -> Result<(), LedgerError> {
    if self.authorizer.authorize(cap, &self.id) {
      Ok(())
    } else {
      warn!(holder = %cap.holder(), ledger = %self.id, "Rejected administrative call");
      Err(LedgerError::NotOwner)
    }
  }

  // ── lifecycle ───────────────────────────────────────────

  /// Open a new market accepting bets for `duration` seconds.
  ///
  /// # Errors
  /// `NotOwner`, `ContractPaused`, `InvalidDuration` on zero duration.
  #[instrument(skip(self, cap, question, description))]
  pub async fn create_market(
    &self,
    cap: &AdminCap,
    question: impl Into<String>,
    description: impl Into<String>,
    duration: u64,
  ) -> Result<MarketId, LedgerError> {
    self.authorize(cap)?;
    let mut state = self.state.lock().await;
    if state.paused {
      return Err(LedgerError::ContractPaused);
    }
    if duration == 0 {
      return Err(LedgerError::InvalidDuration);
    }

    let now = self.clock.now();
    let end_time = now
      .checked_add(duration)
      .ok_or(LedgerError::ArithmeticOverflow)?;
    let market_id = state.next_market_id;
    let next = market_id
      .checked_add(1)
      .ok_or(LedgerError::ArithmeticOverflow)?;

    let market = Market::new(
      market_id,
      question.into(),
      description.into(),
      cap.holder().clone(),
      now,
      end_time,
      AccountId::market_escrow(&self.escrow_prefix, self.asset, market_id),
    );
    let event = LedgerEvent::MarketCreated {
      market_id,
      question: market.question.clone(),
      end_time,
      creator: market.creator.clone(),
    };

    state.markets.insert(
      market_id,
      MarketRecord {
        market,
        bets: Vec::new(),
      },
    );
    state.next_market_id = next;
    info!(market_id, end_time, "Market created");
    self.sink.emit(event);
    Ok(market_id)
  }

  /// Stake `amount` on `position`.
  ///
  /// The transaction fee is kept by the ledger; the net stake is routed
  /// to the best venue under the market's escrow. Nothing is recorded
  /// unless that deposit succeeds.
  ///
  /// # Errors
  /// `ContractPaused`, `MarketNotFound`, `MarketNotActive`, `MarketEnded`,
  /// `InvalidAmount`, `InsufficientAmount` when the fee eats the stake,
  /// `DepositFailed` when the venue rejects the net stake.
  #[instrument(skip(self), fields(bettor = %bettor))]
  pub async fn place_bet(
    &self,
    bettor: &AccountId,
    market_id: MarketId,
    position: Position,
    amount: Amount,
  ) -> Result<BetId, LedgerError> {
    let mut state = self.state.lock().await;
    if state.paused {
      return Err(LedgerError::ContractPaused);
    }
    let now = self.clock.now();
    let fees = state.fees;

    let (escrow, bet_id, new_pool) = {
      let record = state.record(market_id)?;
      let market = &record.market;
      if !market.active {
        return Err(LedgerError::MarketNotActive(market_id));
      }
      if market.state(now) != MarketState::Open {
        return Err(LedgerError::MarketEnded(market_id));
      }
      if amount == 0 {
        return Err(LedgerError::InvalidAmount);
      }
      (market.escrow.clone(), record.bets.len(), market.pool(position))
    };

    let split = fees.apply_transaction_fee(amount)?;
    if split.net == 0 {
      return Err(LedgerError::InsufficientAmount { amount });
    }
    let new_pool = new_pool
      .checked_add(split.net)
      .ok_or(LedgerError::ArithmeticOverflow)?;
    let new_tx_total = state
      .transaction_fees_collected
      .checked_add(split.fee)
      .ok_or(LedgerError::ArithmeticOverflow)?;
    let bet_id = BetId::try_from(bet_id).map_err(|_| LedgerError::ArithmeticOverflow)?;

    let receipt = self.selector.auto_deposit(&escrow, split.net).await?;

    // commit
    state.transaction_fees_collected = new_tx_total;
    let record = state.record_mut(market_id)?;
    match position {
      Position::Yes => record.market.total_yes_amount = new_pool,
      Position::No => record.market.total_no_amount = new_pool,
    }
    record.bets.push(Bet {
      id: bet_id,
      market_id,
      bettor: bettor.clone(),
      position,
      amount,
      net_amount: split.net,
      transaction_fee_paid: split.fee,
      placed_at: now,
      claimed: false,
      yield_share: 0,
    });
    state
      .user_bets
      .entry(bettor.clone())
      .or_default()
      .push((market_id, bet_id));

    info!(
      market_id,
      bet_id,
      %position,
      amount,
      net = split.net,
      fee = split.fee,
      protocol = %receipt.protocol,
      "Bet placed"
    );
    self.sink.emit(LedgerEvent::BetPlaced {
      bet_id,
      market_id,
      user: bettor.clone(),
      position,
      amount,
    });
    self.sink.emit(LedgerEvent::YieldDeposited {
      market_id,
      protocol: receipt.protocol,
      amount: receipt.amount,
    });
    Ok(bet_id)
  }

  /// Settle a market on `outcome` and distribute its yield.
  ///
  /// Yield is the escrow's venue balance above total stakes, floored
  /// at zero. The protocol fee is taken from it and stays in escrow
  /// until swept; the rest is split pro rata across every bet.
  ///
  /// # Errors
  /// `NotOwner`, `MarketNotFound`, `MarketAlreadyResolved`,
  /// `MarketNotActive`, `MarketNotEnded`.
  #[instrument(skip(self, cap))]
  pub async fn resolve_market(
    &self,
    cap: &AdminCap,
    market_id: MarketId,
    outcome: Position,
  ) -> Result<Resolution, LedgerError> {
    self.authorize(cap)?;
    let mut state = self.state.lock().await;
    let now = self.clock.now();
    let fees = state.fees;

    let (escrow, total_bet, mut bets) = {
      let record = state.record(market_id)?;
      let market = &record.market;
      if market.resolved {
        return Err(LedgerError::MarketAlreadyResolved(market_id));
      }
      if !market.active {
        return Err(LedgerError::MarketNotActive(market_id));
      }
      if now < market.end_time {
        return Err(LedgerError::MarketNotEnded(market_id));
      }
      (market.escrow.clone(), market.total_bet(), record.bets.clone())
    };

    let total_balance = self.selector.get_total_balance(&escrow).await?;
    let raw_yield = payout::raw_yield(total_balance, total_bet);
    let split = fees.apply_protocol_fee(raw_yield)?;
    let final_yield = split.net;
    let distributed = payout::distribute_yield(&mut bets, final_yield, total_bet)?;
    let protocol_total = state
      .protocol_fees_collected
      .checked_add(split.fee)
      .ok_or(LedgerError::ArithmeticOverflow)?;

    // commit
    state.protocol_fees_collected = protocol_total;
    let record = state.record_mut(market_id)?;
    record.bets = bets;
    let market = &mut record.market;
    market.resolved = true;
    market.outcome = Some(outcome);
    market.resolution_time = Some(now);
    market.total_yield_earned = final_yield;
    market.protocol_fee_retained = market.protocol_fee_retained.saturating_add(split.fee);
    market.active = false;

    info!(
      market_id,
      %outcome,
      total_balance,
      total_bet,
      raw_yield,
      protocol_fee = split.fee,
      final_yield,
      dust = final_yield.saturating_sub(distributed),
      "Market resolved"
    );
    self.sink.emit(LedgerEvent::MarketResolved {
      market_id,
      outcome,
      total_yield_earned: final_yield,
    });

    Ok(Resolution {
      market_id,
      outcome,
      total_balance,
      total_bet,
      raw_yield,
      protocol_fee: split.fee,
      final_yield,
      distributed,
    })
  }

  /// Pay out one bet of a resolved market.
  ///
  /// Winners get stake plus a share of the losing pool, everyone gets
  /// their yield share. The bet is latched as claimed in the same step
  /// as the venue withdrawal; a failed withdrawal leaves it unclaimed.
  ///
  /// # Errors
  /// `MarketNotFound`, `MarketNotResolved`, `BetNotFound`, `NotBetOwner`,
  /// `BetAlreadyClaimed`, `InsufficientBalance` from the venues.
  #[instrument(skip(self), fields(claimant = %claimant))]
  pub async fn claim_winnings(
    &self,
    claimant: &AccountId,
    market_id: MarketId,
    bet_id: BetId,
  ) -> Result<ClaimReceipt, LedgerError> {
    let mut state = self.state.lock().await;

    let (escrow, breakdown) = {
      let record = state.record(market_id)?;
      if !record.market.resolved {
        return Err(LedgerError::MarketNotResolved(market_id));
      }
      let bet = bet_in(record, bet_id)?;
      if &bet.bettor != claimant {
        return Err(LedgerError::NotBetOwner { market_id, bet_id });
      }
      if bet.claimed {
        return Err(LedgerError::BetAlreadyClaimed { market_id, bet_id });
      }
      (
        record.market.escrow.clone(),
        payout::claim_breakdown(&record.market, bet)?,
      )
    };

    let withdrawal = if breakdown.total > 0 {
      self.selector.auto_withdraw(&escrow, breakdown.total).await?
    } else {
      debug!(market_id, bet_id, "Nothing to pay out");
      Withdrawal::default()
    };

    // commit
    let record = state.record_mut(market_id)?;
    let idx = usize::try_from(bet_id).map_err(|_| LedgerError::BetNotFound { market_id, bet_id })?;
    if let Some(bet) = record.bets.get_mut(idx) {
      bet.claimed = true;
    }

    info!(
      market_id,
      bet_id,
      principal = breakdown.principal,
      yield_share = breakdown.yield_share,
      total = breakdown.total,
      "Winnings claimed"
    );
    self.sink.emit(LedgerEvent::WinningsClaimed {
      market_id,
      bet_id,
      user: claimant.clone(),
      winning_amount: breakdown.total,
      yield_share: breakdown.yield_share,
    });

    Ok(ClaimReceipt {
      market_id,
      bet_id,
      claimant: claimant.clone(),
      principal: breakdown.principal,
      yield_share: breakdown.yield_share,
      total: breakdown.total,
      withdrawal,
    })
  }

  /// Implied odds as floored percentages; `(50, 50)` with no stakes.
  pub async fn get_odds(&self, market_id: MarketId) -> Result<Odds, LedgerError> {
    let state = self.state.lock().await;
    Ok(state.record(market_id)?.market.odds())
  }

  // ── administration ──────────────────────────────────────

  /// Stop accepting new markets and bets. Resolution and claims stay open.
  pub async fn pause(&self, cap: &AdminCap) -> Result<(), LedgerError> {
    self.set_paused(cap, true).await
  }

  pub async fn unpause(&self, cap: &AdminCap) -> Result<(), LedgerError> {
    self.set_paused(cap, false).await
  }

  async fn set_paused(&self, cap: &AdminCap, paused: bool) -> Result<(), LedgerError> {
    self.authorize(cap)?;
    let mut state = self.state.lock().await;
    if state.paused != paused {
      state.paused = paused;
      info!(paused, "Ledger pause flag changed");
    }
    Ok(())
  }

  pub async fn is_paused(&self) -> bool {
    self.state.lock().await.paused
  }

  /// Replace both fee rates. Applies to bets placed and markets
  /// resolved from now on.
  ///
  /// # Errors
  /// `NotOwner`, `FeeTooHigh`.
  pub async fn set_fee_rates(
    &self,
    cap: &AdminCap,
    protocol_fee_bp: u64,
    transaction_fee_bp: u64,
  ) -> Result<FeeSchedule, LedgerError> {
    self.authorize(cap)?;
    let fees = FeeSchedule::new(protocol_fee_bp, transaction_fee_bp)?;
    self.state.lock().await.fees = fees;
    info!(protocol_fee_bp, transaction_fee_bp, "Fee rates updated");
    Ok(fees)
  }

  pub async fn set_fee_recipient(&self, cap: &AdminCap, recipient: AccountId) -> Result<(), LedgerError> {
    self.authorize(cap)?;
    info!(recipient = %recipient, "Fee recipient updated");
    self.state.lock().await.fee_recipient = recipient;
    Ok(())
  }

  /// Pay collected fees out to the fee recipient.
  ///
  /// Protocol fees are withdrawn from each resolved market's escrow;
  /// transaction fees were never routed to venues. A market whose
  /// escrow cannot cover its retained fee is left for a later sweep.
  ///
  /// # Errors
  /// `NotOwner`.
  #[instrument(skip(self, cap))]
  pub async fn sweep_fees(&self, cap: &AdminCap) -> Result<FeeSweep, LedgerError> {
    self.authorize(cap)?;
    let mut state = self.state.lock().await;

    let pending: Vec<(MarketId, AccountId, Amount)> = state
      .markets
      .values()
      .filter(|r| r.market.protocol_fee_retained > 0)
      .map(|r| (r.market.id, r.market.escrow.clone(), r.market.protocol_fee_retained))
      .collect();

    let mut protocol_fees: Amount = 0;
    for (market_id, escrow, retained) in pending {
      match self.selector.auto_withdraw(&escrow, retained).await {
        Ok(withdrawal) => {
          protocol_fees = protocol_fees.saturating_add(withdrawal.total);
          let record = state.record_mut(market_id)?;
          record.market.protocol_fee_retained = 0;
        }
        Err(e) => warn!(market_id, retained, error = %e, "Protocol fee not swept"),
      }
    }

    let transaction_fees = state.transaction_fees_collected;
    state.transaction_fees_collected = 0;
    state.protocol_fees_collected = state.protocol_fees_collected.saturating_sub(protocol_fees);
    let recipient = state.fee_recipient.clone();

    info!(recipient = %recipient, protocol_fees, transaction_fees, "Fees swept");
    self.sink.emit(LedgerEvent::FeesSwept {
      recipient: recipient.clone(),
      protocol_fees,
      transaction_fees,
    });
    Ok(FeeSweep {
      recipient,
      protocol_fees,
      transaction_fees,
    })
  }

  /// Register a yield venue for this ledger's asset.
  ///
  /// # Errors
  /// `NotOwner`, `AssetMismatch`, `VenueAlreadyRegistered`.
  pub async fn register_venue(
    &self,
    cap: &AdminCap,
    venue: Arc<dyn YieldVenue>,
    risk_tier: RiskTier,
  ) -> Result<ProtocolId, LedgerError> {
    self.authorize(cap)?;
    self.selector.register_venue(venue, risk_tier).await
  }

  // ── queries ─────────────────────────────────────────────

  pub async fn get_market(&self, market_id: MarketId) -> Result<Market, LedgerError> {
    let state = self.state.lock().await;
    Ok(state.record(market_id)?.market.clone())
  }

  /// Lifecycle state of a market at the current ledger time.
  pub async fn market_state(&self, market_id: MarketId) -> Result<MarketState, LedgerError> {
    let state = self.state.lock().await;
    Ok(state.record(market_id)?.market.state(self.clock.now()))
  }

  pub async fn get_bet(&self, market_id: MarketId, bet_id: BetId) -> Result<Bet, LedgerError> {
    let state = self.state.lock().await;
    bet_in(state.record(market_id)?, bet_id).cloned()
  }

  pub async fn get_market_bets(&self, market_id: MarketId) -> Result<Vec<Bet>, LedgerError> {
    let state = self.state.lock().await;
    Ok(state.record(market_id)?.bets.clone())
  }

  /// Every bet placed by `user`.
  pub async fn get_user_bets(&self, user: &AccountId) -> Vec<Bet> {
    let state = self.state.lock().await;
    state
      .user_bets
      .get(user)
      .map(|ids| {
        ids
          .iter()
          .filter_map(|(m, b)| state.record(*m).ok().and_then(|r| bet_in(r, *b).ok()).cloned())
          .collect()
      })
      .unwrap_or_default()
  }

  pub async fn market_count(&self) -> usize {
    self.state.lock().await.markets.len()
  }

  pub async fn fee_schedule(&self) -> FeeSchedule {
    self.state.lock().await.fees
  }

  pub async fn fee_recipient(&self) -> AccountId {
    self.state.lock().await.fee_recipient.clone()
  }

  pub async fn fee_totals(&self) -> FeeTotals {
    let state = self.state.lock().await;
    FeeTotals {
      protocol: state.protocol_fees_collected,
      transaction: state.transaction_fees_collected,
    }
  }

  /// Live venue balance of a market's escrow.
  pub async fn escrow_balance(&self, market_id: MarketId) -> Result<Amount, LedgerError> {
    let state = self.state.lock().await;
    let escrow = state.record(market_id)?.market.escrow.clone();
    self.selector.get_total_balance(&escrow).await
  }

  // ── persistence ─────────────────────────────────────────

  /// Point-in-time copy of the full ledger state.
  pub async fn snapshot(&self) -> LedgerSnapshot {
    let state = self.state.lock().await;
    LedgerSnapshot {
      version: SNAPSHOT_VERSION.to_string(),
      ledger_id: self.id,
      asset: self.asset,
      escrow_prefix: self.escrow_prefix.clone(),
      fees: state.fees,
      fee_recipient: state.fee_recipient.clone(),
      protocol_fees_collected: state.protocol_fees_collected,
      transaction_fees_collected: state.transaction_fees_collected,
      paused: state.paused,
      next_market_id: state.next_market_id,
      markets: state.markets.values().cloned().collect(),
      taken_at: self.clock.now(),
    }
  }
}

fn check_asset(asset: AssetKind, selector: &ProtocolSelector) -> Result<(), LedgerError> {
  if selector.asset() == asset {
    Ok(())
  } else {
    Err(LedgerError::AssetMismatch {
      expected: asset,
      found: selector.asset(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex as StdMutex;

  use super::*;
  use crate::adapters::auth::CapabilityAuthorizer;
  use crate::adapters::clock::ManualClock;
  use crate::adapters::venues::SimulatedVenue;
  use crate::domain::venue::SelectionPolicy;

  #[derive(Default)]
  struct RecordingSink(StdMutex<Vec<LedgerEvent>>);

  impl RecordingSink {
    fn names(&self) -> Vec<&'static str> {
      self.0.lock().unwrap().iter().map(LedgerEvent::name).collect()
    }
  }

  impl EventSink for RecordingSink {
    fn emit(&self, event: LedgerEvent) {
      self.0.lock().unwrap().push(event);
    }
  }

  type TestLedger = MarketLedger<CapabilityAuthorizer, ManualClock, RecordingSink>;

  struct Fixture {
    ledger: TestLedger,
    cap: AdminCap,
    venue: Arc<SimulatedVenue>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
  }

  async fn fixture(protocol_fee_bp: u64, transaction_fee_bp: u64) -> Fixture {
    let id = LedgerId::new();
    let authorizer = Arc::new(CapabilityAuthorizer::new());
    let cap = authorizer.issue(id, AccountId::from("admin"));
    let clock = Arc::new(ManualClock::new(1_000));
    let sink = Arc::new(RecordingSink::default());
    let selector = Arc::new(ProtocolSelector::new(AssetKind::Usdc, SelectionPolicy::default()));
    let venue = Arc::new(SimulatedVenue::new(ProtocolId::Navi, AssetKind::Usdc, 500));
    let settings = LedgerSettings {
      asset: AssetKind::Usdc,
      escrow_prefix: "escrow".to_string(),
      fees: FeeSchedule::new(protocol_fee_bp, transaction_fee_bp).unwrap(),
      fee_recipient: AccountId::from("treasury"),
    };
    let ledger = MarketLedger::new(id, settings, selector, authorizer, clock.clone(), sink.clone()).unwrap();
    ledger
      .register_venue(&cap, venue.clone(), RiskTier::try_from(2).unwrap())
      .await
      .unwrap();
    Fixture {
      ledger,
      cap,
      venue,
      clock,
      sink,
    }
  }

  fn user(name: &str) -> AccountId {
    AccountId::from(name)
  }

  #[tokio::test]
  async fn test_bet_records_net_stake_after_fee() {
    let f = fixture(2_000, 100).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 86_400).await.unwrap();

    let bet_id = f.ledger.place_bet(&user("alice"), m, Position::Yes, 10_000).await.unwrap();
    let bet = f.ledger.get_bet(m, bet_id).await.unwrap();
    assert_eq!(bet.net_amount, 9_900);
    assert_eq!(bet.transaction_fee_paid, 100);

    let market = f.ledger.get_market(m).await.unwrap();
    assert_eq!(market.total_yes_amount, 9_900);
    assert_eq!(f.ledger.escrow_balance(m).await.unwrap(), 9_900);
    assert_eq!(f.ledger.fee_totals().await.transaction, 100);
    assert_eq!(
      f.sink.names(),
      vec!["market_created", "bet_placed", "yield_deposited"]
    );
  }

  #[tokio::test]
  async fn test_odds() {
    let f = fixture(0, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 100).await.unwrap();
    assert_eq!(f.ledger.get_odds(m).await.unwrap(), Odds { yes_pct: 50, no_pct: 50 });

    f.ledger.place_bet(&user("a"), m, Position::Yes, 5_000).await.unwrap();
    assert_eq!(f.ledger.get_odds(m).await.unwrap(), Odds { yes_pct: 100, no_pct: 0 });

    f.ledger.place_bet(&user("b"), m, Position::No, 3_000).await.unwrap();
    assert_eq!(f.ledger.get_odds(m).await.unwrap(), Odds { yes_pct: 62, no_pct: 37 });
  }

  #[tokio::test]
  async fn test_resolve_and_claim_full_scenario() {
    let f = fixture(2_000, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 100).await.unwrap();
    let alice = user("alice");
    let bob = user("bob");
    let a = f.ledger.place_bet(&alice, m, Position::Yes, 5_000).await.unwrap();
    let b = f.ledger.place_bet(&bob, m, Position::No, 3_000).await.unwrap();

    let escrow = f.ledger.get_market(m).await.unwrap().escrow;
    f.venue.credit_yield(&escrow, 3_000).await;
    f.clock.advance(100);

    let resolution = f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap();
    assert_eq!(resolution.total_balance, 11_000);
    assert_eq!(resolution.raw_yield, 3_000);
    assert_eq!(resolution.protocol_fee, 600);
    assert_eq!(resolution.final_yield, 2_400);
    assert_eq!(f.ledger.market_state(m).await.unwrap(), MarketState::Resolved);

    let claim = f.ledger.claim_winnings(&alice, m, a).await.unwrap();
    assert_eq!(claim.principal, 8_000);
    assert_eq!(claim.yield_share, 1_500);
    assert_eq!(claim.total, 9_500);

    let loser = f.ledger.claim_winnings(&bob, m, b).await.unwrap();
    assert_eq!(loser.principal, 0);
    assert_eq!(loser.yield_share, 900);

    // only the protocol fee is left in escrow
    assert_eq!(f.ledger.escrow_balance(m).await.unwrap(), 600);
    let sweep = f.ledger.sweep_fees(&f.cap).await.unwrap();
    assert_eq!(sweep.protocol_fees, 600);
    assert_eq!(f.ledger.escrow_balance(m).await.unwrap(), 0);
    assert_eq!(f.ledger.fee_totals().await, FeeTotals::default());
  }

  #[tokio::test]
  async fn test_double_claim_rejected() {
    let f = fixture(0, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 10).await.unwrap();
    let alice = user("alice");
    let a = f.ledger.place_bet(&alice, m, Position::Yes, 1_000).await.unwrap();
    f.clock.advance(10);
    f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap();

    f.ledger.claim_winnings(&alice, m, a).await.unwrap();
    assert_eq!(
      f.ledger.claim_winnings(&alice, m, a).await.unwrap_err(),
      LedgerError::BetAlreadyClaimed { market_id: m, bet_id: a }
    );
    assert_eq!(f.venue.balance(&f.ledger.get_market(m).await.unwrap().escrow).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_claim_checks() {
    let f = fixture(0, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 10).await.unwrap();
    let a = f.ledger.place_bet(&user("alice"), m, Position::Yes, 1_000).await.unwrap();

    assert_eq!(
      f.ledger.claim_winnings(&user("alice"), m, a).await.unwrap_err(),
      LedgerError::MarketNotResolved(m)
    );
    f.clock.advance(10);
    f.ledger.resolve_market(&f.cap, m, Position::No).await.unwrap();
    assert_eq!(
      f.ledger.claim_winnings(&user("mallory"), m, a).await.unwrap_err(),
      LedgerError::NotBetOwner { market_id: m, bet_id: a }
    );
    assert_eq!(
      f.ledger.claim_winnings(&user("alice"), m, 7).await.unwrap_err(),
      LedgerError::BetNotFound { market_id: m, bet_id: 7 }
    );
  }

  #[tokio::test]
  async fn test_temporal_state_machine() {
    let f = fixture(0, 0).await;
    assert_eq!(
      f.ledger.create_market(&f.cap, "Q?", "", 0).await.unwrap_err(),
      LedgerError::InvalidDuration
    );
    let m = f.ledger.create_market(&f.cap, "Q?", "", 50).await.unwrap();
    assert_eq!(
      f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap_err(),
      LedgerError::MarketNotEnded(m)
    );

    f.clock.advance(50);
    assert_eq!(f.ledger.market_state(m).await.unwrap(), MarketState::Closed);
    assert_eq!(
      f.ledger.place_bet(&user("a"), m, Position::Yes, 100).await.unwrap_err(),
      LedgerError::MarketEnded(m)
    );

    f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap();
    assert_eq!(
      f.ledger.resolve_market(&f.cap, m, Position::No).await.unwrap_err(),
      LedgerError::MarketAlreadyResolved(m)
    );
    assert_eq!(
      f.ledger.place_bet(&user("a"), 99, Position::Yes, 100).await.unwrap_err(),
      LedgerError::MarketNotFound(99)
    );
  }

  #[tokio::test]
  async fn test_failed_deposit_commits_nothing() {
    let f = fixture(0, 100).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 50).await.unwrap();
    f.venue.set_accepting_deposits(false).await;

    assert!(matches!(
      f.ledger.place_bet(&user("a"), m, Position::Yes, 1_000).await,
      Err(LedgerError::DepositFailed(_))
    ));
    let market = f.ledger.get_market(m).await.unwrap();
    assert_eq!(market.total_yes_amount, 0);
    assert!(f.ledger.get_market_bets(m).await.unwrap().is_empty());
    assert!(f.ledger.get_user_bets(&user("a")).await.is_empty());
    assert_eq!(f.ledger.fee_totals().await.transaction, 0);
  }

  #[tokio::test]
  async fn test_amount_validation() {
    let f = fixture(0, 100).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 50).await.unwrap();
    assert_eq!(
      f.ledger.place_bet(&user("a"), m, Position::Yes, 0).await.unwrap_err(),
      LedgerError::InvalidAmount
    );
    // 1% of 1 floors to zero fee, so a 1-unit stake still nets 1
    assert!(f.ledger.place_bet(&user("a"), m, Position::Yes, 1).await.is_ok());

    f.ledger.set_fee_rates(&f.cap, 0, 1_000).await.unwrap();
    assert!(f.ledger.place_bet(&user("a"), m, Position::Yes, 1).await.is_ok());
    assert!(matches!(
      f.ledger.set_fee_rates(&f.cap, 2_001, 0).await,
      Err(LedgerError::FeeTooHigh { .. })
    ));
  }

  #[tokio::test]
  async fn test_pause_gates_bets_but_not_settlement() {
    let f = fixture(0, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 10).await.unwrap();
    let a = f.ledger.place_bet(&user("a"), m, Position::Yes, 500).await.unwrap();

    f.ledger.pause(&f.cap).await.unwrap();
    assert!(f.ledger.is_paused().await);
    assert_eq!(
      f.ledger.place_bet(&user("a"), m, Position::Yes, 500).await.unwrap_err(),
      LedgerError::ContractPaused
    );

    f.clock.advance(10);
    f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap();
    assert_eq!(f.ledger.claim_winnings(&user("a"), m, a).await.unwrap().total, 500);

    f.ledger.unpause(&f.cap).await.unwrap();
    assert!(!f.ledger.is_paused().await);
  }

  #[tokio::test]
  async fn test_admin_calls_need_a_valid_cap() {
    let f = fixture(0, 0).await;
    let forged = AdminCap::mint(f.ledger.id(), user("admin"));
    assert_eq!(
      f.ledger.create_market(&forged, "Q?", "", 10).await.unwrap_err(),
      LedgerError::NotOwner
    );
    assert_eq!(f.ledger.pause(&forged).await.unwrap_err(), LedgerError::NotOwner);
  }

  #[tokio::test]
  async fn test_venue_loss_floors_yield_at_zero() {
    let f = fixture(2_000, 0).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "", 10).await.unwrap();
    f.ledger.place_bet(&user("a"), m, Position::Yes, 1_000).await.unwrap();
    let escrow = f.ledger.get_market(m).await.unwrap().escrow;
    f.venue.slash(&escrow, 100).await;
    f.clock.advance(10);

    let resolution = f.ledger.resolve_market(&f.cap, m, Position::Yes).await.unwrap();
    assert_eq!(resolution.raw_yield, 0);
    assert_eq!(resolution.final_yield, 0);

    // the shortfall is not socialized: the winner's full principal is owed
    let result = f.ledger.claim_winnings(&user("a"), m, 0).await;
    assert!(matches!(
      result,
      Err(LedgerError::InsufficientBalance { requested: 1_000, available: 900 })
    ));
    assert!(!f.ledger.get_bet(m, 0).await.unwrap().claimed);
  }

  #[tokio::test]
  async fn test_snapshot_restore_keeps_state() {
    let f = fixture(2_000, 100).await;
    let m = f.ledger.create_market(&f.cap, "Q?", "desc", 10).await.unwrap();
    f.ledger.place_bet(&user("a"), m, Position::No, 2_000).await.unwrap();
    let snapshot = f.ledger.snapshot().await;

    let restored: TestLedger = MarketLedger::restore(
      snapshot.clone(),
      f.ledger.selector().clone(),
      Arc::new(CapabilityAuthorizer::new()),
      f.clock.clone(),
      f.sink.clone(),
    )
    .unwrap();
    assert_eq!(restored.id(), f.ledger.id());
    assert_eq!(restored.get_user_bets(&user("a")).await.len(), 1);
    assert_eq!(restored.snapshot().await, snapshot);
  }
}

//! Rebalancing Agent - Scheduled Venue Migration
//!
//! Each round compares, for every escrow holder, the venue holding
//! most of its funds against the selector's current best venue and
//! moves the funds when the decision rule says so.
//!
//! The agent does not schedule itself: callers drive `run_once`
//! from a timer. It only takes the venue registry lock, so betting
//! and claims on the ledger are never blocked on a rebalance round
//! beyond a single fund move.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::LedgerError;
use crate::domain::events::LedgerEvent;
use crate::domain::market::{AccountId, Amount};
use crate::domain::rebalance::{
  RebalanceConfig, RebalanceDecision, RebalanceInstruction, RebalanceState, SkipReason,
};
use crate::ports::clock::Clock;
use crate::ports::event_sink::EventSink;

use super::protocol_selector::ProtocolSelector;

/// Outcome of one rebalance round.
#[derive(Debug, Default)]
pub struct RebalanceReport {
  /// Instructions executed, with the amount actually moved.
  pub executed: Vec<(RebalanceInstruction, Amount)>,
  pub skipped: Vec<(AccountId, SkipReason)>,
  pub failed: Vec<(AccountId, LedgerError)>,
}

impl RebalanceReport {
  pub fn evaluated(&self) -> usize {
    self.executed.len() + self.skipped.len() + self.failed.len()
  }
}

/// Moves escrowed funds toward the best-scoring venue.
pub struct RebalancingAgent<C: Clock, S: EventSink> {
  selector: Arc<ProtocolSelector>,
  clock: Arc<C>,
  sink: Arc<S>,
  state: Mutex<RebalanceState>,
}

impl<C: Clock, S: EventSink> RebalancingAgent<C, S> {
  pub fn new(
    selector: Arc<ProtocolSelector>,
    clock: Arc<C>,
    sink: Arc<S>,
    config: RebalanceConfig,
  ) -> Self {
    Self {
      selector,
      clock,
      sink,
      state: Mutex::new(RebalanceState::new(config)),
    }
  }

  /// Current config and counters.
  pub async fn state(&self) -> RebalanceState {
    self.state.lock().await.clone()
  }

  /// Replace the thresholds, keeping the counters.
  pub async fn set_config(&self, config: RebalanceConfig) {
    self.state.lock().await.config = config;
  }

  /// Run one round.
  ///
  /// Candidates are evaluated one at a time against the counters as
  /// they stand at that point, so moves executed earlier in the round
  /// gate later ones. `min_interval` applies per holder.
  ///
  /// # Errors
  /// Only when the candidate list itself cannot be read. Failures of
  /// individual moves are collected in the report.
  #[instrument(skip(self), name = "rebalance_round")]
  pub async fn run_once(&self) -> Result<RebalanceReport, LedgerError> {
    let now = self.clock.now();
    let candidates = self.selector.rebalance_candidates().await?;

    let mut report = RebalanceReport::default();
    for candidate in candidates {
      let holder = candidate.holder.clone();
      let (decision, min_amount) = {
        let state = self.state.lock().await;
        (state.evaluate(&candidate, now), state.config.min_rebalance_amount)
      };
      let instruction = match decision {
        RebalanceDecision::Rebalance(instruction) => instruction,
        RebalanceDecision::Skip(reason) => {
          debug!(holder = %holder, ?reason, "Rebalance skipped");
          report.skipped.push((holder, reason));
          continue;
        }
      };

      match self.selector.move_funds(&instruction).await {
        // source drained between candidate read and move
        Ok(0) => {
          report
            .skipped
            .push((holder, SkipReason::AmountBelowMinimum { amount: 0, min_amount }));
        }
        Ok(moved) => {
          self.state.lock().await.record(&holder, now);
          info!(
            holder = %holder,
            from = %instruction.from,
            to = %instruction.to,
            amount = moved,
            gap_bp = instruction.gap_bp,
            "Rebalanced"
          );
          self.sink.emit(LedgerEvent::Rebalanced {
            holder,
            from: instruction.from,
            to: instruction.to,
            amount: moved,
          });
          report.executed.push((instruction, moved));
        }
        Err(e) => {
          warn!(holder = %holder, error = %e, "Rebalance failed");
          report.failed.push((holder, e));
        }
      }
    }

    Ok(report)
  }
}

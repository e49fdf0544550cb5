//! Yield distribution and claim arithmetic.
//!
//! Yield is passive income on escrowed capital, so every bet receives a
//! share proportional to its net stake regardless of outcome. Principal
//! follows parimutuel rules: winners get their stake back plus a
//! proportional share of the losing pool, losers get nothing.
//!
//! All divisions floor. Remainders stay in escrow as protocol dust.

use super::error::LedgerError;
use super::market::{Amount, Bet, Market};

/// Yield a market produced: venue balance above total stake, floored at zero.
///
/// A venue loss is absorbed as zero yield rather than charged to bettors.
pub const fn raw_yield(total_balance: Amount, total_bet: Amount) -> Amount {
    total_balance.saturating_sub(total_bet)
}

/// `floor(net_amount * final_yield / total_bet)`.
///
/// # Errors
/// `ArithmeticOverflow` if `net_amount` exceeds `total_bet` far enough for
/// the share not to fit an `Amount`.
pub fn yield_share(
    net_amount: Amount,
    final_yield: Amount,
    total_bet: Amount,
) -> Result<Amount, LedgerError> {
    if total_bet == 0 || final_yield == 0 {
        return Ok(0);
    }
    let share = u128::from(net_amount) * u128::from(final_yield) / u128::from(total_bet);
    Amount::try_from(share).map_err(|_| LedgerError::ArithmeticOverflow)
}

/// Stake back plus `floor(net * losing_pool / winning_pool)`.
///
/// An empty winning pool degenerates to returning the stake alone.
pub fn winner_principal(
    net_amount: Amount,
    winning_pool: Amount,
    losing_pool: Amount,
) -> Result<Amount, LedgerError> {
    if winning_pool == 0 {
        return Ok(net_amount);
    }
    let share = u128::from(net_amount) * u128::from(losing_pool) / u128::from(winning_pool);
    let share = Amount::try_from(share).map_err(|_| LedgerError::ArithmeticOverflow)?;
    net_amount
        .checked_add(share)
        .ok_or(LedgerError::ArithmeticOverflow)
}

/// What a single claim pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimBreakdown {
    /// Stake back plus losing-pool share for winners, zero for losers.
    pub principal: Amount,
    pub yield_share: Amount,
    pub total: Amount,
}

/// Computes the payout of `bet` in resolved `market`.
///
/// # Errors
/// `MarketNotResolved` when the market has no outcome yet.
pub fn claim_breakdown(market: &Market, bet: &Bet) -> Result<ClaimBreakdown, LedgerError> {
    let outcome = match (market.resolved, market.outcome) {
        (true, Some(outcome)) => outcome,
        _ => return Err(LedgerError::MarketNotResolved(market.id)),
    };

    let principal = if bet.is_winner(outcome) {
        winner_principal(
            bet.net_amount,
            market.pool(outcome),
            market.pool(outcome.opposite()),
        )?
    } else {
        0
    };

    let total = principal
        .checked_add(bet.yield_share)
        .ok_or(LedgerError::ArithmeticOverflow)?;

    Ok(ClaimBreakdown {
        principal,
        yield_share: bet.yield_share,
        total,
    })
}

/// Writes every bet's `yield_share` in one pass.
///
/// Shares are computed up front and only assigned once all of them
/// succeeded, so an error leaves every bet untouched. Returns the amount
/// actually distributed, which is at most `final_yield`.
pub fn distribute_yield(
    bets: &mut [Bet],
    final_yield: Amount,
    total_bet: Amount,
) -> Result<Amount, LedgerError> {
    let shares = bets
        .iter()
        .map(|bet| yield_share(bet.net_amount, final_yield, total_bet))
        .collect::<Result<Vec<_>, _>>()?;

    let mut distributed: Amount = 0;
    for (bet, share) in bets.iter_mut().zip(shares) {
        bet.yield_share = share;
        distributed = distributed
            .checked_add(share)
            .ok_or(LedgerError::ArithmeticOverflow)?;
    }
    Ok(distributed)
}

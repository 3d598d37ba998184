//! Whole-share rebalancing towards goal ratios.
//!
//! Each position is first rounded on its own to the share count closest to
//! its goal value (`f64::round`, halves away from zero). The independent
//! roundings leave the portfolio over or under the target value, so a
//! correction pass then moves one share at a time, cheapest position first,
//! until the total no longer exceeds the target. The result is
//! deterministic for identical inputs.

use super::error::{RebalanceError, ValidationError};
use super::portfolio::{Portfolio, Position};
use std::cmp::Ordering;
use tracing::debug;

/// How often the correction pass may cycle through all positions.
pub const MAX_CORRECTION_PASSES: usize = 2;

/// Direction and size of the correction applied after rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    None,
    /// Shares removed because the rounded trades overshot the target.
    RoundedDown(usize),
    /// Shares added because the rounded trades left too much cash.
    RoundedUp(usize),
}

/// Rebalances `portfolio` so that, with `reinvest` added, each position
/// approaches its goal ratio in whole shares.
///
/// Expects `price` to be set on every position. On success `new_shares`,
/// `rebalance_sum`, `rebalance_ratio`, `reinvest`, `sum_existing` and
/// `sum_with_reinvest` are updated and positions keep their order. On
/// error the portfolio is not touched.
pub fn rebalance(portfolio: &mut Portfolio, reinvest: f64) -> Result<Correction, RebalanceError> {
    portfolio.validate()?;
    for position in &portfolio.positions {
        if !(position.price.is_finite() && position.price > 0.0) {
            return Err(ValidationError::InvalidPrice {
                symbol: position.label().to_string(),
                price: position.price,
            }
            .into());
        }
    }

    let sum_existing: f64 = portfolio.positions.iter().map(Position::value).sum();
    let goal_sum = sum_existing + reinvest;
    if !goal_sum.is_finite() || goal_sum == 0.0 {
        return Err(ValidationError::InvalidTarget { goal_sum }.into());
    }

    let mut positions = portfolio.positions.clone();
    let mut sum_with_reinvest = sum_existing;
    let mut costs = Vec::with_capacity(positions.len());
    for position in &mut positions {
        let share_goal_sum = goal_sum * position.goal_ratio;
        let ideal_shares = share_goal_sum / position.price;
        position.new_shares = (ideal_shares - position.shares as f64).round() as i64;
        position.update_rebalance(goal_sum);
        sum_with_reinvest += position.new_shares as f64 * position.price;
        costs.push(position.price / share_goal_sum);
    }

    let order = allocation_order(&costs);
    let correction = correct_rounding(&mut positions, &order, goal_sum, &mut sum_with_reinvest)?;
    match correction {
        Correction::RoundedDown(n) => debug!(
            "Rounded shares would have been too much, rounded down {} shares",
            n
        ),
        Correction::RoundedUp(n) => debug!(
            "Rounded shares would have been too little, rounded up {} shares",
            n
        ),
        Correction::None => debug!("Rounded shares match the target exactly"),
    }

    portfolio.positions = positions;
    portfolio.reinvest = reinvest;
    portfolio.update_sums();
    portfolio.sum_with_reinvest = sum_with_reinvest;
    Ok(correction)
}

impl Position {
    fn update_rebalance(&mut self, goal_sum: f64) {
        self.rebalance_sum = (self.shares as f64 + self.new_shares as f64) * self.price;
        self.rebalance_ratio = self.rebalance_sum / goal_sum;
    }

    fn adjust(&mut self, shares: i64, goal_sum: f64) {
        self.new_shares += shares;
        self.update_rebalance(goal_sum);
    }
}

/// Position indices sorted by allocation cost, cheapest first. Ties keep
/// their original order.
fn allocation_order(costs: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by(|a, b| costs[*a].partial_cmp(&costs[*b]).unwrap_or(Ordering::Equal));
    order
}

/// Moves one share per step along `order` until `sum` is at or below
/// `goal_sum`. When under the goal, shares are added until the goal is
/// reached and the step that reached it is taken back, so cash is left
/// over rather than overspent.
///
/// The index wraps around `order`, at most `MAX_CORRECTION_PASSES` times.
fn correct_rounding(
    positions: &mut [Position],
    order: &[usize],
    goal_sum: f64,
    sum: &mut f64,
) -> Result<Correction, RebalanceError> {
    let max_steps = order.len() * MAX_CORRECTION_PASSES;
    let exhausted = |steps: usize, sum: f64| RebalanceError::Allocation {
        steps,
        positions: order.len(),
        remaining: sum - goal_sum,
    };

    let mut steps = 0;
    if *sum > goal_sum {
        while *sum > goal_sum {
            if steps == max_steps {
                return Err(exhausted(steps, *sum));
            }
            let position = &mut positions[order[steps % order.len()]];
            position.adjust(-1, goal_sum);
            *sum -= position.price;
            steps += 1;
        }
        Ok(Correction::RoundedDown(steps))
    } else if *sum < goal_sum {
        loop {
            if steps == max_steps {
                return Err(exhausted(steps, *sum));
            }
            let position = &mut positions[order[steps % order.len()]];
            position.adjust(1, goal_sum);
            *sum += position.price;
            steps += 1;

            if *sum >= goal_sum {
                position.adjust(-1, goal_sum);
                *sum -= position.price;
                break;
            }
        }
        Ok(Correction::RoundedUp(steps - 1))
    } else {
        Ok(Correction::None)
    }
}

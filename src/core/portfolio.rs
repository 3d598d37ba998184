use super::error::{FetchError, ValidationError};
use super::price::PriceLookup;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Allowed distance of the goal ratio sum from 1.0.
pub const RATIO_TOLERANCE: f64 = 1e-9;

/// One holding of a portfolio.
///
/// `price` onwards are outputs, filled in by valuation and rebalancing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkn: Option<String>,
    pub shares: u64,
    pub goal_ratio: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub current_ratio: f64,
    #[serde(default)]
    pub new_shares: i64,
    #[serde(default)]
    pub rebalance_sum: f64,
    #[serde(default)]
    pub rebalance_ratio: f64,
}

impl Position {
    pub fn new(symbol: &str, shares: u64, goal_ratio: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            isin: None,
            wkn: None,
            shares,
            goal_ratio,
            price: 0.0,
            current_ratio: 0.0,
            new_shares: 0,
            rebalance_sum: 0.0,
            rebalance_ratio: 0.0,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Value of the holding before any trade.
    pub fn value(&self) -> f64 {
        self.shares as f64 * self.price
    }

    /// Identifier used in messages: ISIN or WKN when known, else the symbol.
    pub fn label(&self) -> &str {
        self.isin
            .as_deref()
            .or(self.wkn.as_deref())
            .unwrap_or(&self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub name: String,
    pub positions: Vec<Position>,
    /// Cash to deploy alongside the holdings; negative models a withdrawal.
    #[serde(default)]
    pub reinvest: f64,
    #[serde(default)]
    pub sum_existing: f64,
    #[serde(default)]
    pub sum_with_reinvest: f64,
}

impl Portfolio {
    pub fn new(name: &str, positions: Vec<Position>) -> Self {
        Self {
            name: name.to_string(),
            positions,
            reinvest: 0.0,
            sum_existing: 0.0,
            sum_with_reinvest: 0.0,
        }
    }

    /// Checks the goal ratio invariant: every ratio > 0 and all sum to 1.0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.positions.is_empty() {
            return Err(ValidationError::Empty);
        }

        let mut sum = 0.0;
        for position in &self.positions {
            // Written as a negation so NaN is rejected too
            if !(position.goal_ratio > 0.0) {
                return Err(ValidationError::NonPositiveRatio {
                    symbol: position.label().to_string(),
                    ratio: position.goal_ratio,
                });
            }
            sum += position.goal_ratio;
        }

        if !((sum - 1.0).abs() <= RATIO_TOLERANCE) {
            return Err(ValidationError::RatioSum { sum });
        }
        Ok(())
    }

    /// Recomputes `sum_existing` and every position's `current_ratio`
    /// from the prices already set on the positions.
    pub fn update_sums(&mut self) {
        self.sum_existing = self.positions.iter().map(Position::value).sum();
        for position in &mut self.positions {
            position.current_ratio = if self.sum_existing > 0.0 {
                position.value() / self.sum_existing
            } else {
                0.0
            };
        }
    }
}

/// Prices every position through `prices` and refreshes the portfolio sums.
///
/// Lookups run concurrently; `on_priced` is called once per position as
/// its lookup finishes. The first failed lookup is returned and the
/// portfolio is left as it was.
pub async fn update_portfolio_values(
    portfolio: &mut Portfolio,
    prices: &dyn PriceLookup,
    on_priced: &(dyn Fn() + Sync),
) -> Result<(), FetchError> {
    let lookups = portfolio.positions.iter().map(|position| async move {
        let result = prices.price(&position.symbol).await;
        on_priced();
        result
    });

    let resolved = join_all(lookups)
        .await
        .into_iter()
        .collect::<Result<Vec<f64>, FetchError>>()?;

    for (position, price) in portfolio.positions.iter_mut().zip(resolved) {
        position.price = price;
    }
    portfolio.update_sums();
    debug!(
        portfolio = %portfolio.name,
        sum_existing = portfolio.sum_existing,
        "Updated portfolio values"
    );
    Ok(())
}

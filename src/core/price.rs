//! Pricing abstractions and core types

use super::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider quote fields kept alongside the parsed price.
///
/// Values are stored as the provider formats them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDetails {
    pub symbol: String,
    #[serde(default)]
    pub open: String,
    #[serde(default)]
    pub high: String,
    #[serde(default)]
    pub low: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub latest_trading_day: String,
    #[serde(default)]
    pub previous_close: String,
    #[serde(default)]
    pub change: String,
    #[serde(default)]
    pub change_percent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub details: Option<QuoteDetails>,
}

/// One outbound lookup against a quote provider.
///
/// Implementations perform exactly one request per call and never
/// return a placeholder price on failure.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError>;
}

/// Current unit price of a symbol, as seen by valuation and rebalancing.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<f64, FetchError>;
}

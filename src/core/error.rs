//! Error types shared by the pricing and rebalancing layers

use std::path::PathBuf;
use thiserror::Error;

/// A portfolio that cannot be rebalanced as given.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("portfolio has no positions")]
    Empty,

    #[error("{symbol}: goal ratio {ratio} must be greater than zero")]
    NonPositiveRatio { symbol: String, ratio: f64 },

    #[error("sum of goal ratios is {sum}, expected 1.0")]
    RatioSum { sum: f64 },

    #[error("{symbol}: price {price} is not usable for rebalancing")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("target portfolio value {goal_sum} is not usable for rebalancing")]
    InvalidTarget { goal_sum: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RebalanceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "rounding correction still off by {remaining:.4} after {steps} steps over {positions} positions"
    )]
    Allocation {
        steps: usize,
        positions: usize,
        remaining: f64,
    },
}

/// Failure of a single outbound quote lookup.
///
/// Cloneable so one in-flight fetch can hand the same outcome to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request for {symbol} failed: {reason}")]
    Request { symbol: String, reason: String },

    #[error("request for {symbol} timed out")]
    Timeout { symbol: String },

    #[error("HTTP error: {status} for symbol: {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("failed to parse quote for {symbol}: {reason}")]
    Parse { symbol: String, reason: String },

    #[error("provider returned no quote for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("provider returned unusable price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },
}

impl FetchError {
    pub fn symbol(&self) -> &str {
        match self {
            FetchError::Request { symbol, .. }
            | FetchError::Timeout { symbol }
            | FetchError::Status { symbol, .. }
            | FetchError::Parse { symbol, .. }
            | FetchError::Provider { symbol, .. }
            | FetchError::InvalidPrice { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read price cache {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write price cache {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("price cache {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode price cache: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error(
        "no AlphaVantage API key configured; set providers.alphavantage.api_key or AV_API_KEY"
    )]
    MissingApiKey,

    #[error("invalid cache setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

//! Core business logic abstractions

pub mod config;
pub mod error;
pub mod log;
pub mod portfolio;
pub mod price;
pub mod rebalance;

// Re-export main types for cleaner imports
pub use error::{ConfigurationError, FetchError, PersistenceError, RebalanceError, ValidationError};
pub use portfolio::{Portfolio, Position, update_portfolio_values};
pub use price::{PriceLookup, Quote, QuoteDetails, QuoteSource};
pub use rebalance::{Correction, rebalance};

//! Rate-limited, persistent price cache

pub mod background;
pub mod limiter;

pub use background::BackgroundTasks;
pub use limiter::RateLimiter;

use crate::core::error::{FetchError, PersistenceError};
use crate::core::price::{PriceLookup, QuoteSource};
use crate::store::{CacheFile, PriceEntry, PriceStore};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type InFlight = Shared<BoxFuture<'static, Result<f64, FetchError>>>;

/// Price lookups served from memory, refreshed through a shared
/// [`RateLimiter`] when missing or older than the staleness threshold.
///
/// Cloning is cheap; all clones share the same store, limiter and
/// in-flight requests.
#[derive(Clone)]
pub struct PriceCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: PriceStore,
    limiter: RateLimiter,
    source: Arc<dyn QuoteSource>,
    staleness: Duration,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl PriceCache {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        store: PriceStore,
        limiter: RateLimiter,
        staleness: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                limiter,
                source,
                staleness,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &PriceStore {
        &self.inner.store
    }

    pub fn staleness(&self) -> Duration {
        self.inner.staleness
    }

    /// Current price of `symbol`.
    ///
    /// Fresh entries return without waiting. Otherwise one fetch is made
    /// after a rate-limit permit is granted; concurrent callers for the same
    /// symbol wait on that single fetch. A failed fetch leaves any earlier
    /// entry untouched and returns the error.
    pub async fn get_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let staleness = self.inner.staleness;
        if let Some(price) = self.inner.store.fresh_price(symbol, staleness).await {
            return Ok(price);
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            // A fetch may have finished between the check above and the lock
            if let Some(price) = self.inner.store.fresh_price(symbol, staleness).await {
                return Ok(price);
            }
            in_flight
                .entry(symbol.to_string())
                .or_insert_with(|| self.start_fetch(symbol))
                .clone()
        };

        flight.await
    }

    /// Runs the fetch as its own task so it completes, and releases its
    /// rate-limit slot, even if every waiter goes away.
    fn start_fetch(&self, symbol: &str) -> InFlight {
        debug!("Starting fetch for {}", symbol);
        let symbol = symbol.to_string();
        let task = tokio::spawn(Inner::fetch(Arc::clone(&self.inner), symbol.clone()));
        async move {
            task.await.unwrap_or_else(|e| {
                Err(FetchError::Request {
                    symbol,
                    reason: format!("fetch task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// Symbols currently due for a refresh.
    pub async fn stale_symbols(&self) -> Vec<String> {
        self.inner.store.stale_symbols(self.inner.staleness).await
    }

    /// Stale symbols plus any of `tracked` with no entry yet, sorted.
    pub async fn symbols_due(&self, tracked: &[String]) -> Vec<String> {
        let mut due = self.stale_symbols().await;
        for symbol in tracked {
            if self.inner.store.get(symbol).await.is_none() {
                due.push(symbol.clone());
            }
        }
        due.sort();
        due.dedup();
        due
    }

    /// Merges the entries persisted in `file` into the store.
    pub async fn load_from(&self, file: &CacheFile) -> Result<usize, PersistenceError> {
        let entries = file.load().await?;
        let loaded = entries.len();
        self.inner.store.merge(entries).await;
        info!("Loaded {} cached prices from {}", loaded, file.path().display());
        Ok(loaded)
    }

    /// Writes a snapshot of the store to `file`.
    pub async fn persist_to(&self, file: &CacheFile) -> Result<usize, PersistenceError> {
        let snapshot = self.inner.store.snapshot().await;
        file.save(&snapshot).await?;
        info!("Wrote {} cached prices to {}", snapshot.len(), file.path().display());
        Ok(snapshot.len())
    }
}

impl Inner {
    async fn fetch(inner: Arc<Inner>, symbol: String) -> Result<f64, FetchError> {
        inner.limiter.acquire().await;
        let result = match inner.source.fetch_quote(&symbol).await {
            Ok(quote) => {
                let price = quote.price;
                inner
                    .store
                    .insert(&symbol, PriceEntry::from_quote(quote, Utc::now()))
                    .await;
                info!("Updated symbol {} at {}", symbol, price);
                Ok(price)
            }
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, keeping previous entry");
                Err(e)
            }
        };
        // Stored before removal, so later callers see the new entry
        inner.in_flight.lock().await.remove(&symbol);
        result
    }
}

#[async_trait]
impl PriceLookup for PriceCache {
    async fn price(&self, symbol: &str) -> Result<f64, FetchError> {
        self.get_price(symbol).await
    }
}

//! Wires the price cache to its quote source, cache file and background
//! tasks for the lifetime of one command.

use crate::cache::{BackgroundTasks, PriceCache, RateLimiter};
use crate::core::config::AppConfig;
use crate::core::price::QuoteSource;
use crate::providers::AlphaVantageProvider;
use crate::store::{CacheFile, PriceStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PriceService {
    cache: PriceCache,
    tasks: BackgroundTasks,
}

impl PriceService {
    /// Builds the AlphaVantage provider from `config` and starts the service.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        let provider = AlphaVantageProvider::new(
            config.alphavantage_base_url(),
            &api_key,
            config.cache.request_timeout(),
        )
        .context("Failed to build HTTP client")?;
        Self::start(config, Arc::new(provider)).await
    }

    /// Loads the persisted cache, if any, and starts periodic persistence.
    ///
    /// An unreadable cache file is logged and ignored; the service starts
    /// empty and overwrites it on the next flush.
    pub async fn start(config: &AppConfig, source: Arc<dyn QuoteSource>) -> Result<Self> {
        let file = CacheFile::new(config.cache_file_path()?);
        let cache = PriceCache::new(
            source,
            PriceStore::new(),
            RateLimiter::new(config.cache.fetch_interval()),
            config.cache.staleness(),
        );

        if let Err(e) = cache.load_from(&file).await {
            warn!(error = %e, "Ignoring unreadable price cache");
        }

        let mut tasks = BackgroundTasks::new();
        debug!("Price service started with cache at {}", file.path().display());
        tasks.spawn_persistence(cache.clone(), file, config.cache.persist_interval());

        Ok(Self { cache, tasks })
    }

    /// Also refreshes stale entries and missing `tracked` symbols in the
    /// background every `period`.
    pub fn with_sweep(mut self, period: std::time::Duration, tracked: Vec<String>) -> Self {
        self.tasks.spawn_refresh_sweep(self.cache.clone(), period, tracked);
        self
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Stops background work; the cache is written one final time.
    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
    }
}

/// Completes on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

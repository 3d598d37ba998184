//! Long-running cache maintenance: periodic persistence and a staleness
//! sweep. Every task watches one shared [`CancellationToken`] and finishes
//! its final action before [`BackgroundTasks::shutdown`] returns.

use super::PriceCache;
use crate::store::CacheFile;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct BackgroundTasks {
    shutdown: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Writes the store to `file` every `period`, and once more on shutdown.
    pub fn spawn_persistence(&mut self, cache: PriceCache, file: CacheFile, period: Duration) {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(persistence_loop(cache, file, period, shutdown));
        self.handles.push(("persistence", handle));
    }

    /// Refreshes stale entries, and `tracked` symbols not yet cached, every
    /// `period` through the cache, so the shared rate limit applies to them
    /// like any other lookup. A failed symbol is retried on the next pass.
    pub fn spawn_refresh_sweep(
        &mut self,
        cache: PriceCache,
        period: Duration,
        tracked: Vec<String>,
    ) {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(refresh_sweep(cache, period, tracked, shutdown));
        self.handles.push(("refresh sweep", handle));
    }

    /// Cancels all tasks and waits for each to finish its final action.
    pub async fn shutdown(self) {
        debug!("Stopping {} background tasks", self.handles.len());
        self.shutdown.cancel();
        for (name, handle) in self.handles {
            match handle.await {
                Ok(()) => debug!("Background task {} stopped", name),
                Err(e) => warn!(error = %e, "Background task {} failed", name),
            }
        }
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

async fn flush(cache: &PriceCache, file: &CacheFile) {
    if let Err(e) = cache.persist_to(file).await {
        warn!(error = %e, "Failed to persist price cache");
    }
}

async fn persistence_loop(
    cache: PriceCache,
    file: CacheFile,
    period: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => flush(&cache, &file).await,
            () = shutdown.cancelled() => {
                info!("Persisting price cache before shutdown");
                flush(&cache, &file).await;
                break;
            }
        }
    }
}

async fn refresh_sweep(
    cache: PriceCache,
    period: Duration,
    tracked: Vec<String>,
    shutdown: CancellationToken,
) {
    loop {
        let due = cache.symbols_due(&tracked).await;
        if !due.is_empty() {
            info!("Refreshing {} outdated or missing symbols", due.len());
        }

        for symbol in due {
            tokio::select! {
                result = cache.get_price(&symbol) => {
                    if let Err(e) = result {
                        warn!(error = %e, "Refresh of {} failed", symbol);
                    }
                }
                () = shutdown.cancelled() => return,
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            () = shutdown.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{MockQuoteSource, cache_with};
    use crate::store::PriceEntry;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_flushes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path().join("prices.json"));
        let source = Arc::new(MockQuoteSource::new(&[("IBM", 145.3)]));
        let cache = cache_with(source, 0);

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_persistence(cache.clone(), file.clone(), Duration::from_secs(3600));
        cache.get_price("IBM").await.unwrap();
        tasks.shutdown().await;

        let persisted = file.load().await.unwrap();
        assert_eq!(persisted["IBM"].price, 145.3);
    }

    #[tokio::test]
    async fn test_periodic_flush() {
        let dir = tempfile::tempdir().unwrap();
        let file = CacheFile::new(dir.path().join("prices.json"));
        let source = Arc::new(MockQuoteSource::new(&[("IBM", 145.3)]));
        let cache = cache_with(source, 0);
        cache.get_price("IBM").await.unwrap();

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_persistence(cache.clone(), file.clone(), Duration::from_millis(20));

        let mut waited = 0;
        while !file.path().exists() && waited < 100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += 1;
        }

        assert!(file.path().exists());
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_refreshes_stale_entries_through_limiter() {
        let source = Arc::new(MockQuoteSource::new(&[("A", 11.0), ("B", 22.0)]));
        let cache = cache_with(Arc::clone(&source), 13);
        let old = Utc::now() - chrono::Duration::hours(48);
        cache.store().insert("A", PriceEntry::new(10.0, old)).await;
        cache.store().insert("B", PriceEntry::new(20.0, old)).await;
        cache
            .store()
            .insert("C", PriceEntry::new(30.0, Utc::now()))
            .await;

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_refresh_sweep(cache.clone(), Duration::from_secs(600), Vec::new());

        // A is fetched at once, B one interval later
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(source.calls(), 2);

        tasks.shutdown().await;
        assert_eq!(cache.store().get("A").await.unwrap().price, 11.0);
        assert_eq!(cache.store().get("B").await.unwrap().price, 22.0);
        assert_eq!(cache.store().get("C").await.unwrap().price, 30.0);
        assert!(cache.stale_symbols().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_permit_wait() {
        let source = Arc::new(MockQuoteSource::new(&[("A", 1.0), ("B", 2.0)]));
        let cache = cache_with(Arc::clone(&source), 3600);
        let old = Utc::now() - chrono::Duration::hours(48);
        cache.store().insert("A", PriceEntry::new(1.0, old)).await;
        cache.store().insert("B", PriceEntry::new(2.0, old)).await;

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_refresh_sweep(cache.clone(), Duration::from_secs(600), Vec::new());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = tokio::time::Instant::now();
        tasks.shutdown().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_retries_tracked_symbol_after_failure() {
        let source = Arc::new(MockQuoteSource::new(&[]));
        let cache = cache_with(Arc::clone(&source), 0);

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_refresh_sweep(
            cache.clone(),
            Duration::from_secs(600),
            vec!["NEW".to_string()],
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert!(cache.store().get("NEW").await.is_none());

        source.set_price("NEW", 42.0);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(source.calls(), 2);
        assert_eq!(cache.store().get("NEW").await.unwrap().price, 42.0);

        // Cached and fresh now, so later passes leave it alone
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls(), 2);
        tasks.shutdown().await;
    }
}

use crate::cache::PriceCache;
use anyhow::Result;
use tracing::info;

/// Waits while the service's refresh sweep keeps `symbols` fresh. Never
/// returns on its own; the caller ends it on a shutdown signal.
pub async fn run(cache: &PriceCache, symbols: &[String]) -> Result<()> {
    info!(
        "Watching {} symbols ({} cached), press Ctrl-C to stop",
        symbols.len(),
        cache.store().len().await
    );
    std::future::pending().await
}

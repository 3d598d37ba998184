use crate::core::price::{Quote, QuoteDetails};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Last known price of a symbol and when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub price: f64,
    pub last_fetched: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteDetails>,
}

impl PriceEntry {
    pub fn new(price: f64, last_fetched: DateTime<Utc>) -> Self {
        Self {
            price,
            last_fetched,
            quote: None,
        }
    }

    pub fn from_quote(quote: Quote, last_fetched: DateTime<Utc>) -> Self {
        Self {
            price: quote.price,
            last_fetched,
            quote: quote.details,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_fetched
    }

    pub fn is_fresh(&self, staleness: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < staleness
    }
}

/// Shared `symbol -> PriceEntry` map.
///
/// Many readers or a single writer at a time; every accessor takes the
/// lock for one operation only, so callers never observe a partial entry.
#[derive(Debug, Default)]
pub struct PriceStore {
    entries: RwLock<HashMap<String, PriceEntry>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &str) -> Option<PriceEntry> {
        let entries = self.entries.read().await;
        let entry = entries.get(symbol).cloned();
        if entry.is_some() {
            debug!("Price store HIT for symbol: {}", symbol);
        } else {
            debug!("Price store MISS for symbol: {}", symbol);
        }
        entry
    }

    /// Price of `symbol` if it was fetched less than `staleness` ago.
    pub async fn fresh_price(&self, symbol: &str, staleness: Duration) -> Option<f64> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .get(symbol)
            .filter(|entry| entry.is_fresh(staleness, now))
            .map(|entry| entry.price)
    }

    pub async fn insert(&self, symbol: &str, entry: PriceEntry) {
        let mut entries = self.entries.write().await;
        debug!("Price store PUT for symbol: {}", symbol);
        entries.insert(symbol.to_string(), entry);
    }

    /// Symbols whose entries are at least `staleness` old, sorted.
    pub async fn stale_symbols(&self, staleness: Duration) -> Vec<String> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(staleness, now))
            .map(|(symbol, _)| symbol.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Point-in-time copy of all entries, ordered by symbol.
    pub async fn snapshot(&self) -> BTreeMap<String, PriceEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(symbol, entry)| (symbol.clone(), entry.clone()))
            .collect()
    }

    /// Adds `loaded` to the store. Entries already present are newer than
    /// anything on disk and are kept.
    pub async fn merge(&self, loaded: HashMap<String, PriceEntry>) {
        let mut entries = self.entries.write().await;
        for (symbol, entry) in loaded {
            entries.entry(symbol).or_insert(entry);
        }
        debug!("Price store now holds {} entries", entries.len());
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aged(price: f64, hours: i64) -> PriceEntry {
        PriceEntry::new(price, Utc::now() - Duration::hours(hours))
    }

    #[tokio::test]
    async fn test_store_get_insert() {
        let store = PriceStore::new();

        assert!(store.get("IBM").await.is_none());
        assert_eq!(store.len().await, 0);

        store.insert("IBM", aged(123.0, 0)).await;
        assert_eq!(store.get("IBM").await.map(|e| e.price), Some(123.0));
        assert!(store.get("MSFT").await.is_none());

        store.insert("IBM", aged(124.0, 0)).await;
        assert_eq!(store.get("IBM").await.map(|e| e.price), Some(124.0));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_fresh_price_respects_staleness() {
        let store = PriceStore::new();
        store.insert("NEW", aged(1.0, 1)).await;
        store.insert("OLD", aged(2.0, 25)).await;

        let day = Duration::hours(24);
        assert_eq!(store.fresh_price("NEW", day).await, Some(1.0));
        assert_eq!(store.fresh_price("OLD", day).await, None);
        assert_eq!(store.fresh_price("NONE", day).await, None);
        assert_eq!(store.stale_symbols(day).await, vec!["OLD".to_string()]);
        assert_eq!(store.stale_symbols(Duration::minutes(1)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_keeps_newer_entries() {
        let store = PriceStore::new();
        store.insert("IBM", aged(130.0, 0)).await;

        store
            .merge(HashMap::from([
                ("IBM".to_string(), aged(100.0, 30)),
                ("MSFT".to_string(), aged(300.0, 30)),
            ]))
            .await;

        assert_eq!(store.get("IBM").await.map(|e| e.price), Some(130.0));
        assert_eq!(store.get("MSFT").await.map(|e| e.price), Some(300.0));
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let store = PriceStore::new();
        store.insert("B", aged(2.0, 0)).await;
        store.insert("A", aged(1.0, 0)).await;

        let snapshot = store.snapshot().await;
        store.insert("C", aged(3.0, 0)).await;

        assert_eq!(store.len().await, 3);
        assert_eq!(
            snapshot.keys().collect::<Vec<_>>(),
            vec![&"A".to_string(), &"B".to_string()]
        );
    }

    #[test]
    fn test_entry_json_format() {
        let entry = PriceEntry::new(
            12.5,
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );

        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["price"], 12.5);
        assert_eq!(json["lastFetched"], "2024-05-01T10:00:00Z");
        assert!(json.get("quote").is_none());
    }
}

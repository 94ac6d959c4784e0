//! Bounded, TTL-based in-memory candle cache.
//!
//! The cache is an explicit value owned by whoever builds the fetcher stack;
//! there is no process-wide cache. `CachedFetcher` wraps any `CandleFetcher`
//! and serves repeat requests for the same (symbol, interval, limit) from the
//! cache until the entry expires.
//!
//! Eviction: expired entries are purged first; if the cache is still full the
//! oldest insertion is dropped.

use super::provider::{CandleFetcher, FetchError};
use crate::domain::Candle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    interval: String,
    limit: usize,
}

#[derive(Debug)]
struct CacheEntry {
    inserted_at: Instant,
    candles: Arc<Vec<Candle>>,
}

/// Bounded TTL cache of candle series.
#[derive(Debug)]
pub struct CandleCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl CandleCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(symbol: &str, interval: &str, limit: usize) -> CacheKey {
        CacheKey {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            limit,
        }
    }

    /// Look up a fresh entry. Expired entries are removed on access.
    pub fn get(&self, symbol: &str, interval: &str, limit: usize) -> Option<Arc<Vec<Candle>>> {
        let key = Self::key(symbol, interval, limit);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(Arc::clone(&entry.candles)),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, symbol: &str, interval: &str, limit: usize, candles: Vec<Candle>) -> Arc<Vec<Candle>> {
        let key = Self::key(symbol, interval, limit);
        let candles = Arc::new(candles);
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                candles: Arc::clone(&candles),
            },
        );
        candles
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fetcher that consults a `CandleCache` before delegating.
///
/// Errors are never cached.
pub struct CachedFetcher<F> {
    inner: F,
    cache: Arc<CandleCache>,
    name: String,
}

impl<F: CandleFetcher> CachedFetcher<F> {
    pub fn new(inner: F, cache: Arc<CandleCache>) -> Self {
        let name = format!("cached({})", inner.name());
        Self { inner, cache, name }
    }
}

impl<F: CandleFetcher> CandleFetcher for CachedFetcher<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, FetchError> {
        if let Some(hit) = self.cache.get(symbol, interval, limit) {
            trace!(symbol, interval, limit, "candle cache hit");
            return Ok(hit.as_ref().clone());
        }
        let candles = self.inner.fetch(symbol, interval, limit)?;
        let stored = self.cache.insert(symbol, interval, limit, candles);
        Ok(stored.as_ref().clone())
    }
}

//! Time-bounded cache in front of a geocoding service.
//!
//! Epistemic foundation:
//! - K_i: Keys are the normalised location text, so runs for different places never share an entry
//! - B_i: A cached box is still right until its TTL runs out
//! - I^R: TTL is configurable
//!
//! Failed lookups are not cached. Expired entries are dropped on every insert.

use super::GeocodingService;
use crate::models::{LocationBounds, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    bounds: LocationBounds,
    stored_at: Instant,
}

/// Geocoding decorator with per-key TTL expiry.
pub struct CachedGeocoder<G> {
    inner: G,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<G: GeocodingService> CachedGeocoder<G> {
    pub fn new(inner: G, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(location: &str) -> String {
        location
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.stored_at.elapsed() <= self.ttl
    }

    fn lookup(&self, key: &str) -> Option<LocationBounds> {
        let fresh = {
            let entry = self.entries.get(key)?;
            self.is_fresh(&entry).then(|| entry.bounds.clone())
        };

        if fresh.is_none() {
            // Another run may have stored a fresh entry since the read.
            self.entries.remove_if(key, |_, entry| !self.is_fresh(entry));
        }
        fresh
    }

    /// Drop every expired entry.
    fn evict_expired(&self) {
        self.entries.retain(|_, entry| self.is_fresh(entry));
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<G: GeocodingService> GeocodingService for CachedGeocoder<G> {
    async fn resolve(&self, location: &str) -> Result<LocationBounds> {
        let key = Self::key(location);

        if let Some(bounds) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(location = %location, "Geocoding cache hit");
            return Ok(bounds);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let bounds = self.inner.resolve(location).await?;
        self.evict_expired();
        self.entries.insert(
            key,
            CacheEntry {
                bounds: bounds.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(bounds)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

//! Read-through cache for per-user state snapshots.
//!
//! The cache only absorbs polling load. Callers treat every error as a miss and
//! compute from the ledger instead, so a broken cache never changes results.
//! It is constructed once at startup and handed around as `Arc<dyn SnapshotCache>`.

use crate::{core::state::CurrentState, errors::Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{sync::RwLock, time::Instant};
use tracing::trace;

/// Cache key for a user's state snapshot.
#[must_use]
pub fn state_key(user_id: i64) -> String {
    format!("state:{user_id}")
}

/// Key/value cache with per-entry TTL.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Returns the value if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<CurrentState>>;

    /// Stores a value for `ttl`.
    async fn set(&self, key: &str, value: CurrentState, ttl: Duration) -> Result<()>;

    /// Drops a value so the next read recomputes it.
    async fn invalidate(&self, key: &str) -> Result<()>;

    /// Drops every expired entry, returning how many were removed.
    ///
    /// Backends that expire entries on their own keep the default.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// In-process TTL map behind a `tokio` `RwLock`.
///
/// Expired entries are dropped when read and by [`SnapshotCache::purge_expired`],
/// which the sweeper calls on every tick.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (Instant, CurrentState)>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CurrentState>> {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((expires_at, value)) if *expires_at > now => {
                    trace!("Cache hit for {}", key);
                    return Ok(Some(value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().await;
            // A writer may have refreshed the entry between the two locks
            if entries
                .get(key)
                .is_some_and(|(expires_at, _)| *expires_at <= now)
            {
                entries.remove(key);
                trace!("Evicted expired entry {}", key);
            }
        }
        trace!("Cache miss for {}", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: CurrentState, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (expires_at, value));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        Ok(before - entries.len())
    }
}

const EPOCH_STRIPES: u64 = 64;

/// Per-user invalidation counters, striped over a fixed number of slots so the
/// table never grows.
///
/// A reader records [`InvalidationEpochs::current`] before computing a snapshot
/// and only keeps the snapshot cached while the counter is unchanged. Users that
/// share a stripe occasionally skip a cache write; results are never stale.
#[derive(Debug)]
pub struct InvalidationEpochs {
    stripes: Vec<AtomicU64>,
}

impl Default for InvalidationEpochs {
    fn default() -> Self {
        Self {
            stripes: (0..EPOCH_STRIPES).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl InvalidationEpochs {
    fn stripe(&self, user_id: i64) -> Option<&AtomicU64> {
        let index = usize::try_from(user_id.unsigned_abs() % EPOCH_STRIPES).ok()?;
        self.stripes.get(index)
    }

    /// Counter value for `user_id`.
    #[must_use]
    pub fn current(&self, user_id: i64) -> u64 {
        self.stripe(user_id)
            .map_or(0, |stripe| stripe.load(Ordering::Acquire))
    }

    /// Records an invalidation for `user_id`.
    pub fn bump(&self, user_id: i64) {
        if let Some(stripe) = self.stripe(user_id) {
            stripe.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn snapshot(user_id: i64) -> CurrentState {
        CurrentState {
            user_id,
            per_slot: Vec::new(),
            total_current_earnings: Decimal::ZERO,
            yield_balance: Decimal::ZERO,
            total_current_balance: Decimal::ZERO,
            computed_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() -> Result<()> {
        let cache = InMemoryCache::new();
        cache
            .set(&state_key(1), snapshot(1), Duration::from_secs(5))
            .await?;
        assert!(cache.get(&state_key(1)).await?.is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get(&state_key(1)).await?.is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() -> Result<()> {
        let cache = InMemoryCache::new();
        cache
            .set(&state_key(1), snapshot(1), Duration::from_secs(5))
            .await?;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get(&state_key(1)).await?.is_none());
        // Already gone, nothing left to purge
        assert_eq!(cache.purge_expired().await?, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_expired() -> Result<()> {
        let cache = InMemoryCache::new();
        for user_id in 1..=3 {
            cache
                .set(&state_key(user_id), snapshot(user_id), Duration::from_secs(5))
                .await?;
        }
        cache
            .set(&state_key(4), snapshot(4), Duration::from_secs(60))
            .await?;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired().await?, 3);
        assert_eq!(cache.purge_expired().await?, 0);
        assert_eq!(cache.get(&state_key(4)).await?.unwrap().user_id, 4);
        Ok(())
    }

    #[test]
    fn test_epochs_track_invalidations() {
        let epochs = InvalidationEpochs::default();
        let before = epochs.current(7);
        epochs.bump(7);
        assert_ne!(epochs.current(7), before);
        // Negative ids map to a stripe as well
        epochs.bump(-7);
        assert!(epochs.current(-7) > 0);
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() -> Result<()> {
        let cache = InMemoryCache::new();
        cache
            .set(&state_key(1), snapshot(1), Duration::from_secs(60))
            .await?;
        cache
            .set(&state_key(2), snapshot(2), Duration::from_secs(60))
            .await?;

        cache.invalidate(&state_key(1)).await?;
        assert!(cache.get(&state_key(1)).await?.is_none());
        assert_eq!(cache.get(&state_key(2)).await?.unwrap().user_id, 2);
        assert_eq!(cache.purge_expired().await?, 0);
        Ok(())
    }
}

//! In-process revocation store.
//!
//! Sharded maps keep lookups for unrelated keys from contending. Expired
//! records are treated as absent on read and swept every few writes, so the
//! maps only ever hold entries that are still inside their token's lifetime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{RevocationStore, StoreError};
use crate::clock::Clock;

/// Run a sweep of expired records after this many writes.
const SWEEP_EVERY_WRITES: u64 = 64;

pub struct MemoryRevocationStore {
    clock: Arc<dyn Clock>,
    /// token id -> expiry
    blacklist: DashMap<String, u64>,
    /// refresh jti -> expiry
    consumed: DashMap<String, u64>,
    /// identity key -> refresh generation
    generations: DashMap<String, u64>,
    writes: AtomicU64,
}

impl MemoryRevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            blacklist: DashMap::new(),
            consumed: DashMap::new(),
            generations: DashMap::new(),
            writes: AtomicU64::new(0),
        }
    }

    fn live(map: &DashMap<String, u64>, key: &str, now: u64) -> bool {
        match map.get(key) {
            Some(entry) if *entry > now => true,
            Some(entry) => {
                drop(entry);
                map.remove_if(key, |_, exp| *exp <= now);
                false
            }
            None => false,
        }
    }

    fn sweep(&self, now: u64) -> u64 {
        let before = self.blacklist.len() + self.consumed.len();
        self.blacklist.retain(|_, exp| *exp > now);
        self.consumed.retain(|_, exp| *exp > now);
        let after = self.blacklist.len() + self.consumed.len();
        before.saturating_sub(after) as u64
    }

    fn after_write(&self, now: u64) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            let removed = self.sweep(now);
            if removed > 0 {
                tracing::debug!(removed, "Swept expired revocation records");
            }
        }
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn blacklist_access(&self, token_id: &str, expires_at: u64) -> Result<(), StoreError> {
        let now = self.clock.now();
        if expires_at <= now {
            return Ok(());
        }
        self.blacklist.insert(token_id.to_string(), expires_at);
        self.after_write(now);
        Ok(())
    }

    async fn is_access_blacklisted(&self, token_id: &str) -> Result<bool, StoreError> {
        Ok(Self::live(&self.blacklist, token_id, self.clock.now()))
    }

    async fn invalidate_all_refresh(&self, identity_key: &str) -> Result<u64, StoreError> {
        let mut generation = self
            .generations
            .entry(identity_key.to_string())
            .or_insert(0);
        *generation += 1;
        Ok(*generation)
    }

    async fn refresh_generation(&self, identity_key: &str) -> Result<u64, StoreError> {
        Ok(self
            .generations
            .get(identity_key)
            .map(|g| *g)
            .unwrap_or(0))
    }

    async fn record_refresh_used(&self, jti: &str, expires_at: u64) -> Result<bool, StoreError> {
        let now = self.clock.now();
        // The entry guard holds the shard lock, so check and insert are one step.
        let won = match self.consumed.entry(jti.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(expires_at.max(now.saturating_add(1)));
                true
            }
        };
        if won {
            self.after_write(now);
        }
        Ok(won)
    }

    async fn is_refresh_consumed(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(Self::live(&self.consumed, jti, self.clock.now()))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(self.sweep(self.clock.now()))
    }

    async fn tracked_entries(&self) -> Result<usize, StoreError> {
        Ok(self.blacklist.len() + self.consumed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    const START: u64 = 1_700_000_000;

    fn store() -> (MemoryRevocationStore, Arc<ManualClock>) {
        let clock = ManualClock::new(START);
        (MemoryRevocationStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_blacklist_until_expiry() {
        let (store, clock) = store();

        store.blacklist_access("tok-1", START + 300).await.unwrap();
        assert!(store.is_access_blacklisted("tok-1").await.unwrap());
        assert!(!store.is_access_blacklisted("tok-2").await.unwrap());

        clock.advance(Duration::from_secs(299));
        assert!(store.is_access_blacklisted("tok-1").await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!store.is_access_blacklisted("tok-1").await.unwrap());
        assert_eq!(store.tracked_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_already_expired_token_not_recorded() {
        let (store, _clock) = store();

        store.blacklist_access("old", START - 1).await.unwrap();
        store.blacklist_access("now", START).await.unwrap();
        assert_eq!(store.tracked_entries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_consumed_once() {
        let (store, _clock) = store();

        assert!(!store.is_refresh_consumed("jti-1").await.unwrap());
        assert!(store.record_refresh_used("jti-1", START + 60).await.unwrap());
        assert!(!store.record_refresh_used("jti-1", START + 60).await.unwrap());
        assert!(store.is_refresh_consumed("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_generation_bumps() {
        let (store, _clock) = store();

        assert_eq!(store.refresh_generation("a@example.com").await.unwrap(), 0);
        assert_eq!(store.invalidate_all_refresh("a@example.com").await.unwrap(), 1);
        assert_eq!(store.invalidate_all_refresh("a@example.com").await.unwrap(), 2);
        assert_eq!(store.refresh_generation("a@example.com").await.unwrap(), 2);
        assert_eq!(store.refresh_generation("b@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_size_bounded_under_login_logout_cycles() {
        let (store, clock) = store();

        for i in 0..10_000u64 {
            let now = clock.now();
            store
                .blacklist_access(&format!("tok-{i}"), now + 900)
                .await
                .unwrap();
            clock.advance(Duration::from_secs(60));
        }

        // Only tokens issued in the last 15 minutes can still be live, plus
        // whatever accumulated since the last sweep.
        let tracked = store.tracked_entries().await.unwrap();
        assert!(
            tracked <= 15 + SWEEP_EVERY_WRITES as usize,
            "store grew to {tracked} entries"
        );
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store();

        store.blacklist_access("a", START + 10).await.unwrap();
        store.blacklist_access("b", START + 1000).await.unwrap();
        store.record_refresh_used("r", START + 10).await.unwrap();

        clock.advance(Duration::from_secs(20));
        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.tracked_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_consumption_has_one_winner() {
        let (store, _clock) = store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_refresh_used("shared", START + 60).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
